//! Prompt Library
//!
//! Named `{placeholder}` templates. Built-in defaults can be overridden by a
//! `<dir>/<name>.txt` file.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub const PRODUCT_IMAGE: &str = "product_image_generation";
pub const TRANSLATION: &str = "message_translation";
pub const COMPOSITION: &str = "campaign_composition";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt not found: {0}")]
    NotFound(String),

    #[error("Prompt '{prompt}' is missing a value for {{{placeholder}}}")]
    MissingValue { prompt: String, placeholder: String },

    #[error("Failed to read prompt file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct PromptLibrary {
    dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, String>>,
}

impl PromptLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self {
            dir: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn load(&self, name: &str) -> Result<String, PromptError> {
        if let Some(template) = self.cache.read().get(name) {
            return Ok(template.clone());
        }

        let from_file = match &self.dir {
            Some(dir) => {
                let path = dir.join(format!("{}.txt", name));
                if path.is_file() {
                    Some(fs::read_to_string(path)?.trim().to_string())
                } else {
                    None
                }
            }
            None => None,
        };

        let template = match from_file {
            Some(t) => t,
            None => builtin_template(name)
                .ok_or_else(|| PromptError::NotFound(name.to_string()))?
                .to_string(),
        };

        self.cache.write().insert(name.to_string(), template.clone());
        Ok(template)
    }

    /// Substitute every `{key}` in the named template.
    pub fn render(&self, name: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self.load(name)?;
        substitute(name, &template, values)
    }
}

fn substitute(name: &str, template: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let key = &after[..close];
        let is_placeholder = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if is_placeholder {
            let value = values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
                .ok_or_else(|| PromptError::MissingValue {
                    prompt: name.to_string(),
                    placeholder: key.to_string(),
                })?;
            out.push_str(value);
        } else {
            out.push('{');
            out.push_str(key);
            out.push('}');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn builtin_template(name: &str) -> Option<&'static str> {
    match name {
        PRODUCT_IMAGE => Some(
            "Professional product photograph of {product_name}: {product_description}. \
             Style: {brand_theme}. Studio lighting, clean background, high detail, \
             no text, no logos.",
        ),
        TRANSLATION => Some(
            "Translate the following marketing message into {target_language} for an \
             audience in {region} ({target_audience}). Keep the tone persuasive and \
             culturally natural. Reply with the translation only.\n\nMessage: {message}",
        ),
        COMPOSITION => Some(
            "Create a {dimensions} social media advertisement using the supplied product \
             image. Product: {product_description}. Headline text: \"{translated_message}\" \
             (original: \"{original_message}\"). Use the font {brand_font}, primary color \
             {primary_color} and secondary color {secondary_color}. Show the website \
             {brand_domain} in the footer. Leave the top-right corner clear for the logo.",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_render() {
        let prompts = PromptLibrary::builtin();
        let text = prompts
            .render(
                TRANSLATION,
                &[
                    ("target_language", "French"),
                    ("region", "france"),
                    ("target_audience", "students"),
                    ("message", "Hello"),
                ],
            )
            .unwrap();
        assert!(text.contains("into French"));
        assert!(text.ends_with("Message: Hello"));
    }

    #[test]
    fn test_missing_value_is_error() {
        let prompts = PromptLibrary::builtin();
        let err = prompts.render(PRODUCT_IMAGE, &[("product_name", "Bottle")]).unwrap_err();
        assert!(matches!(err, PromptError::MissingValue { .. }));
    }

    #[test]
    fn test_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("message_translation.txt"),
            "To {target_language}: {message}\n",
        )
        .unwrap();
        let prompts = PromptLibrary::new(dir.path());
        let text = prompts
            .render(TRANSLATION, &[("target_language", "German"), ("message", "Hi")])
            .unwrap();
        assert_eq!(text, "To German: Hi");
    }

    #[test]
    fn test_non_placeholder_braces_kept() {
        let out = substitute("t", "json {\"a\": 1} and {x}", &[("x", "y")]).unwrap();
        assert_eq!(out, "json {\"a\": 1} and y");
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(matches!(
            PromptLibrary::builtin().load("nope"),
            Err(PromptError::NotFound(_))
        ));
    }
}
