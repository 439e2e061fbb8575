//! Vision-model clients that describe an image in a few words.
//!
//! The pipeline only sees [`DescriptionGenerator`]; each provider lives in its
//! own submodule.

mod gemini;
mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Reads a configuration variable; `std::env::var` outside tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_WEBP: &str = "image/webp";

pub const DEFAULT_PROMPT: &str = "You are a helpful assistant that names image files.
Describe this image in a concise way that would make a good filename.
Focus on the main subject and key details.
Keep it brief but descriptive.
Reply with the description only.
Example descriptions:
- Sunset over Golden Gate Bridge
- Two Cats Playing with Red Yarn
- Mountain Lake Reflecting Snow Peaks
- Child Blowing Birthday Candles";

/// Extra instruction per attempt; later attempts ask for shorter output.
const BREVITY_HINTS: &[&str] = &[
    "",
    "The previous description was too long for a filename. Keep it brief: at most eight words.",
    "The previous description was far too long for a filename. Keep it very brief: at most four words.",
];

/// Prompt for the given zero-based attempt.
pub fn prompt_for_attempt(attempt: usize) -> String {
    let hint = BREVITY_HINTS[attempt.min(BREVITY_HINTS.len() - 1)];
    if hint.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        format!("{DEFAULT_PROMPT}\n{hint}")
    }
}

/// Image bytes ready to upload.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl GenerateError {
    /// Whether this failure should be absorbed by the rate limiter's backoff.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            GenerateError::RateLimited(_) => true,
            GenerateError::Provider { status, message } => {
                *status == 429 || looks_rate_limited(message)
            }
            GenerateError::Http(e) => {
                e.status().map(|s| s.as_u16()) == Some(429) || looks_rate_limited(&e.to_string())
            }
            GenerateError::Timeout(_) | GenerateError::MalformedResponse(_) => false,
        }
    }
}

/// Error text that providers use for quota and throttling failures.
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("resource has been exhausted")
        || lower.contains("resource_exhausted")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no model configured")]
    NoModels,
    #[error("{var} environment variable not set. Get one from {url}")]
    MissingCredential { var: &'static str, url: &'static str },
    #[error("model {0} does not support any image types")]
    NoImageSupport(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    /// Model name, used in log lines.
    fn name(&self) -> &str;

    /// MIME types this model accepts as attachments.
    fn attachment_types(&self) -> &[&'static str];

    /// Describe `image` following `prompt`.
    async fn generate(&self, image: &EncodedImage, prompt: &str) -> Result<String, GenerateError>;
}

/// Build one generator per model name, in the order given.
///
/// Fails before any file is touched when a credential is missing or a model
/// cannot take images.
pub fn build_generators(models: &[String]) -> Result<Vec<Arc<dyn DescriptionGenerator>>, ConfigError> {
    build_generators_with(models, &|var: &str| std::env::var(var).ok())
}

fn build_generators_with(
    models: &[String],
    env: EnvLookup<'_>,
) -> Result<Vec<Arc<dyn DescriptionGenerator>>, ConfigError> {
    if models.is_empty() {
        return Err(ConfigError::NoModels);
    }
    let mut generators: Vec<Arc<dyn DescriptionGenerator>> = Vec::with_capacity(models.len());
    for model in models {
        let generator: Arc<dyn DescriptionGenerator> = if GeminiGenerator::handles(model) {
            Arc::new(GeminiGenerator::from_env(model, env)?)
        } else {
            Arc::new(OpenAiGenerator::from_env(model, env)?)
        };
        ensure_image_support(generator.as_ref())?;
        generators.push(generator);
    }
    Ok(generators)
}

fn ensure_image_support(generator: &dyn DescriptionGenerator) -> Result<(), ConfigError> {
    let supported = generator
        .attachment_types()
        .iter()
        .any(|mime| [MIME_JPEG, MIME_PNG, MIME_WEBP].contains(mime));
    if supported {
        Ok(())
    } else {
        Err(ConfigError::NoImageSupport(generator.name().to_string()))
    }
}

pub(crate) fn data_url(image: &EncodedImage) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
    format!("data:{};base64,{}", image.mime_type, encoded)
}

pub(crate) fn http_client() -> Result<reqwest::Client, ConfigError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}
