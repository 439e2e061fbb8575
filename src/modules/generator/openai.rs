use async_trait::async_trait;
use log::debug;
use super::{
    data_url, http_client, ConfigError, EnvLookup, DescriptionGenerator, EncodedImage, GenerateError, MIME_JPEG,
    MIME_PNG, MIME_WEBP,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Models that only accept text.
const TEXT_ONLY_PREFIXES: &[&str] = &["o1-mini", "o1-preview", "o3-mini", "gpt-3.5"];

const IMAGE_TYPES: &[&str] = &[MIME_JPEG, MIME_PNG, MIME_WEBP];

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn from_env(model: &str, env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let api_key = env("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential {
                var: "OPENAI_API_KEY",
                url: "https://platform.openai.com/api-keys",
            })?;
        let base_url = env("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(http_client()?, base_url, api_key, model))
    }

    pub fn new(client: reqwest::Client, base_url: String, api_key: String, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl DescriptionGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn attachment_types(&self) -> &[&'static str] {
        if TEXT_ONLY_PREFIXES
            .iter()
            .any(|prefix| self.model.starts_with(prefix))
        {
            &[]
        } else {
            IMAGE_TYPES
        }
    }

    async fn generate(&self, image: &EncodedImage, prompt: &str) -> Result<String, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url(image) } }
                ]
            }]
        });

        debug!("Requesting description from {}", self.model);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerateError::MalformedResponse(json.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(model: &str) -> OpenAiGenerator {
        OpenAiGenerator::new(
            reqwest::Client::new(),
            "http://localhost:1/v1/".to_string(),
            "key".to_string(),
            model,
        )
    }

    #[test]
    fn text_only_models_take_no_images() {
        assert!(generator("o1-mini").attachment_types().is_empty());
        assert_eq!(generator("gpt-4o-mini").attachment_types(), IMAGE_TYPES);
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        assert_eq!(generator("gpt-4o").base_url, "http://localhost:1/v1");
    }
}
