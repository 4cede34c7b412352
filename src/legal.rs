//! Legal Scanner - Prohibited Content Detection
//!
//! Rules map a category to a severity and a word list. Both the original and
//! the translated message are always scanned, even when identical, so that
//! translation-introduced wording is caught.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{error, warn};

/// Ordered so that `max` yields the highest severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    None,
    Warning,
    Error,
}

impl Severity {
    /// Unknown labels are treated as warnings.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Severity::Error,
            "NONE" => Severity::None,
            _ => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Severity::parse(&label))
    }
}

fn default_rule_severity() -> Severity {
    Severity::Warning
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRule {
    #[serde(default = "default_rule_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub words: Vec<String>,
}

/// Category name -> rule, iterated in category order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LegalRules(pub BTreeMap<String, CategoryRule>);

impl LegalRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load rules from JSON. Any failure yields an empty rule set.
    pub fn load_or_empty(path: &Path) -> Self {
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<LegalRules>(&raw).map_err(|e| e.to_string()));
        match parsed {
            Ok(rules) => rules,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load prohibited words");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|rule| rule.words.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegalCheckResult {
    pub prohibited_words_found: Vec<String>,
    pub severity: Severity,
    pub blocked: bool,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageSource {
    Original,
    Translated,
}

impl MessageSource {
    fn label(&self) -> &'static str {
        match self {
            MessageSource::Original => "original",
            MessageSource::Translated => "translated",
        }
    }
}

pub struct LegalScanner {
    rules: LegalRules,
}

impl LegalScanner {
    pub fn new(rules: LegalRules) -> Self {
        Self { rules }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(LegalRules::load_or_empty(path))
    }

    pub fn rules(&self) -> &LegalRules {
        &self.rules
    }

    /// Add a word at runtime. A new category takes `severity`; an existing
    /// category keeps its own.
    pub fn add_word(&mut self, category: &str, word: &str, severity: Severity) {
        let rule = self
            .rules
            .0
            .entry(category.to_string())
            .or_insert_with(|| CategoryRule {
                severity,
                words: vec![],
            });
        if !rule.words.iter().any(|w| w == word) {
            rule.words.push(word.to_string());
        }
    }

    pub fn check(&self, original: &str, translated: &str) -> LegalCheckResult {
        let mut violations = vec![];
        let mut highest = Severity::None;

        for (source, text) in [
            (MessageSource::Original, original),
            (MessageSource::Translated, translated),
        ] {
            let haystack = text.to_lowercase();
            for (category, rule) in &self.rules.0 {
                for word in &rule.words {
                    let needle = word.to_lowercase();
                    if !haystack.contains(&needle) {
                        continue;
                    }
                    let violation = format!(
                        "[{}] {}: '{}' in {} message",
                        rule.severity,
                        category,
                        word,
                        source.label()
                    );
                    warn!("{}", violation);
                    violations.push(violation);
                    highest = highest.max(rule.severity);
                }
            }
        }

        let blocked = highest == Severity::Error;
        let details = if violations.is_empty() {
            "No legal issues detected".to_string()
        } else {
            format!("Found {} legal issue(s)", violations.len())
        };

        if blocked {
            error!(details = %details, "Legal check BLOCKED");
        } else if !violations.is_empty() {
            warn!(issues = violations.len(), "Legal warnings");
        }

        LegalCheckResult {
            prohibited_words_found: violations,
            severity: highest,
            blocked,
            details,
        }
    }
}
