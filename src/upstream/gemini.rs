//! Gemini `generateContent` client
//!
//! Issues the outbound generation call and extracts inline image payloads
//! from the response. The API emits inline data under camelCase or
//! snake_case keys depending on the serving stack, so the extraction tries
//! both conventions in a fixed order.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::UpstreamConfig;

/// Fallback MIME type when upstream omits one
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Errors from the outbound generation call
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("failed to reach generation service: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("generation service returned invalid JSON: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("generation service rejected the request with status {status}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Client for the generateContent endpoint
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Build a client with the configured request deadline
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }

    /// Whether an API key is available
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Issue a single generateContent call with the prompt as the sole
    /// content part. One attempt, no retry.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<Value, GeminiError> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(GeminiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(GeminiError::Decode)
    }
}

/// Inline image payload extracted from a generateContent response
#[derive(Debug, Clone)]
pub struct InlineImage {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type as reported by upstream, if any
    pub mime_type: Option<String>,
}

// Key-naming conventions, in priority order: camelCase wins when both appear.
const INLINE_DATA_KEYS: [&str; 2] = ["inlineData", "inline_data"];
const MIME_TYPE_KEYS: [&str; 2] = ["mimeType", "mime_type"];

/// Scan the first candidate's content parts, in order, for an inline
/// image payload. Returns `None` when no part carries one.
pub fn extract_inline_image(response: &Value) -> Option<InlineImage> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    parts.iter().find_map(inline_image_part)
}

fn inline_image_part(part: &Value) -> Option<InlineImage> {
    INLINE_DATA_KEYS.iter().find_map(|key| {
        let inline = part.get(key)?;
        let data = inline
            .get("data")?
            .as_str()
            .filter(|data| !data.is_empty())?;

        // The MIME field may use either convention regardless of which
        // convention carried the data object
        let mime_type = MIME_TYPE_KEYS
            .iter()
            .find_map(|k| inline.get(k).and_then(Value::as_str))
            .map(ToString::to_string);

        Some(InlineImage {
            data: data.to_string(),
            mime_type,
        })
    })
}
