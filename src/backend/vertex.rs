//! Vertex AI adapter (Imagen + Gemini REST endpoints).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{BackendError, BaseAssetRequest, GenerativeBackend, TranslationRequest, VariantRequest};
use crate::prompts::{self, PromptLibrary};
use crate::settings::Settings;

pub struct VertexBackend {
    client: Client,
    project: String,
    location: String,
    imagen_model: String,
    text_model: String,
    compose_model: String,
    access_token: String,
    prompts: Arc<PromptLibrary>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

impl VertexBackend {
    pub fn new(settings: &Settings, prompts: Arc<PromptLibrary>) -> Result<Self, BackendError> {
        if settings.gcp_project_id.is_empty() {
            return Err(BackendError::Failed("gcp_project_id is not configured".into()));
        }
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| BackendError::Failed(e.to_string()))?;

        Ok(Self {
            client,
            project: settings.gcp_project_id.clone(),
            location: settings.gcp_location.clone(),
            imagen_model: settings.imagen_model.clone(),
            text_model: settings.text_model.clone(),
            compose_model: settings.compose_model.clone(),
            access_token: settings.access_token.clone(),
            prompts,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            concat!(
                "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}",
                "/locations/{loc}/publishers/google/models/{model}:{method}",
            ),
            loc = self.location,
            project = self.project,
            model = model,
            method = method,
        )
    }

    fn post(&self, url: &str, body: &Value) -> Result<Response, BackendError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            Err(BackendError::RateLimited(format!("{}: {}", status, detail)))
        } else {
            Err(BackendError::Failed(format!("{}: {}", status, detail)))
        }
    }

    fn generate_content(&self, model: &str, body: &Value) -> Result<Vec<Part>, BackendError> {
        let response: GenerateContentResponse = self
            .post(&self.model_url(model, "generateContent"), body)?
            .json()
            .map_err(map_transport_error)?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            let feedback = response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "N/A".into());
            return Err(BackendError::Empty(format!(
                "no candidates, content may be blocked by safety filters (feedback: {})",
                feedback
            )));
        };

        match candidate.content {
            Some(content) if !content.parts.is_empty() => Ok(content.parts),
            _ => Err(BackendError::Empty(format!(
                "empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("N/A")
            ))),
        }
    }

    fn render(&self, name: &str, values: &[(&str, &str)]) -> Result<String, BackendError> {
        self.prompts
            .render(name, values)
            .map_err(|e| BackendError::Failed(e.to_string()))
    }
}

impl GenerativeBackend for VertexBackend {
    fn generate_base_asset(&self, request: &BaseAssetRequest) -> Result<Vec<u8>, BackendError> {
        let prompt = self.render(
            prompts::PRODUCT_IMAGE,
            &[
                ("product_name", request.product_name.as_str()),
                ("product_description", request.product_description.as_str()),
                ("brand_theme", request.brand_theme.as_str()),
            ],
        )?;

        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "1:1",
                "safetySetting": "block_medium_and_above",
                "personGeneration": "allow_adult",
            }
        });

        let response: PredictResponse = self
            .post(&self.model_url(&self.imagen_model, "predict"), &body)?
            .json()
            .map_err(map_transport_error)?;

        let encoded = response
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or_else(|| BackendError::Empty("no generated images".into()))?;
        decode_image(&encoded)
    }

    fn translate_text(&self, request: &TranslationRequest) -> Result<String, BackendError> {
        let prompt = self.render(
            prompts::TRANSLATION,
            &[
                ("target_language", request.target_language.as_str()),
                ("region", request.region.as_str()),
                ("target_audience", request.target_audience.as_str()),
                ("message", request.message.as_str()),
            ],
        )?;

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let text: String = self
            .generate_content(&self.text_model, &body)?
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::Empty("translation response had no text".into()));
        }
        Ok(text.to_string())
    }

    fn compose_variant(&self, request: &VariantRequest) -> Result<Vec<u8>, BackendError> {
        let prompt = self.render(
            prompts::COMPOSITION,
            &[
                ("dimensions", request.aspect_ratio.as_str()),
                ("original_message", request.original_message.as_str()),
                ("translated_message", request.translated_message.as_str()),
                ("brand_font", request.font_name.as_str()),
                ("primary_color", request.primary_color.as_str()),
                ("secondary_color", request.secondary_color.as_str()),
                ("brand_domain", request.domain.as_str()),
                ("product_description", request.product_description.as_str()),
            ],
        )?;

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.base_mime_type,
                            "data": STANDARD.encode(&request.base_image)
                        }
                    },
                    { "text": prompt }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": request.aspect_ratio }
            }
        });

        let parts = self.generate_content(&self.compose_model, &body)?;
        let encoded = parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .ok_or_else(|| BackendError::Empty("response contained no inline image data".into()))?;
        decode_image(&encoded.data)
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, BackendError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| BackendError::Failed(format!("invalid base64 image payload: {}", e)))
}

fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        BackendError::RateLimited(err.to_string())
    } else {
        BackendError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_project() {
        let settings = Settings::default();
        let result = VertexBackend::new(&settings, Arc::new(PromptLibrary::builtin()));
        assert!(result.is_err());
    }

    #[test]
    fn test_model_url() {
        let settings = Settings {
            gcp_project_id: "demo".into(),
            ..Settings::default()
        };
        let backend = VertexBackend::new(&settings, Arc::new(PromptLibrary::builtin())).unwrap();
        assert_eq!(
            backend.model_url("gemini-2.5-flash", "generateContent"),
            concat!(
                "https://us-central1-aiplatform.googleapis.com/v1/projects/demo",
                "/locations/us-central1/publishers/google/models/gemini-2.5-flash:generateContent",
            )
        );
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        assert!(decode_image("@@not-base64@@").is_err());
        assert_eq!(decode_image(&STANDARD.encode(b"png")).unwrap(), b"png");
    }

    #[test]
    fn test_parse_content_response() {
        let raw = r#"{"candidates": [{"content": {"parts": [
            {"text": "Bonjour"},
            {"inlineData": {"mimeType": "image/png", "data": "AAE="}}
        ]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let parts = &parsed.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("Bonjour"));
        assert_eq!(parts[1].inline_data.as_ref().unwrap().data, "AAE=");
    }
}
