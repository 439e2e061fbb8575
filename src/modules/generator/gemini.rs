use async_trait::async_trait;
use base64::Engine;
use log::debug;
use super::{
    http_client, ConfigError, DescriptionGenerator, EnvLookup, EncodedImage, GenerateError, MIME_JPEG, MIME_PNG,
    MIME_WEBP,
};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const IMAGE_TYPES: &[&str] = &[MIME_JPEG, MIME_PNG, MIME_WEBP];

/// Google Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn handles(model: &str) -> bool {
        model.starts_with("gemini")
    }

    pub fn from_env(model: &str, env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let api_key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
            .iter()
            .find_map(|var| env(*var).filter(|key| !key.trim().is_empty()))
            .ok_or(ConfigError::MissingCredential {
                var: "GEMINI_API_KEY",
                url: "https://aistudio.google.com/apikey",
            })?;
        Ok(Self {
            client: http_client()?,
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl DescriptionGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn attachment_types(&self) -> &[&'static str] {
        IMAGE_TYPES
    }

    async fn generate(&self, image: &EncodedImage, prompt: &str) -> Result<String, GenerateError> {
        let data = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": image.mime_type, "data": data } }
                ]
            }]
        });

        debug!("Requesting description from {}", self.model);
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", BASE_URL, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(GenerateError::RateLimited(message));
            }
            return Err(GenerateError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let parts = json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| GenerateError::MalformedResponse(json.to_string()))?;
        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(GenerateError::MalformedResponse(json.to_string()));
        }
        Ok(text)
    }
}
