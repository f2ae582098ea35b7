//! Generate proxy module
//!
//! Handles `POST /api/generate`: validates the JSON body, forwards the
//! prompt to the upstream generation service, and translates the result
//! into the simplified client-facing shape.

use crate::config::AppState;
use crate::http;
use crate::logger;
use crate::upstream::gemini::{self, GeminiError};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

/// Successful reply carrying the generated image
#[derive(Debug, Serialize)]
struct ImageReply<'a> {
    #[serde(rename = "imageBase64")]
    image_base64: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

/// Informational reply when upstream answered without an image
#[derive(Debug, Serialize)]
struct InfoReply<'a> {
    message: &'a str,
    raw: &'a Value,
}

/// Entry point: collect the request body and run the pipeline
///
/// The body is collected through a `Limited` wrapper so the
/// `max_body_size` cap also holds for chunked requests that carry no
/// Content-Length header.
pub async fn handle(
    req: Request<hyper::body::Incoming>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let max_body_size = usize::try_from(state.config.http.max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            logger::log_warning(&format!(
                "Request body exceeded {max_body_size} bytes, rejecting"
            ));
            return http::build_413_response();
        }
        Err(e) => {
            logger::log_error(&format!("Failed to read request body: {e}"));
            return http::build_json_error(StatusCode::BAD_REQUEST, "invalid request body", None);
        }
    };

    process(state, &body).await
}

/// Validate the request and relay the generation call.
///
/// Linear lifecycle: parse → validate prompt → check credential →
/// single upstream attempt → translate. No retries.
pub async fn process(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    let Ok(request) = serde_json::from_slice::<GenerateRequest>(body) else {
        return http::build_json_error(StatusCode::BAD_REQUEST, "invalid request body", None);
    };

    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return http::build_json_error(StatusCode::BAD_REQUEST, "missing prompt", None);
    }

    let model = request
        .model
        .as_deref()
        .unwrap_or(&state.config.upstream.default_model);

    if !state.gemini.is_configured() {
        logger::log_error("Generation request refused: no API key configured");
        return http::build_json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "service not configured",
            None,
        );
    }

    match state.gemini.generate(model, prompt).await {
        Ok(response) => translate_success(&response),
        Err(GeminiError::Rejected { status, body }) => {
            logger::log_warning(&format!("Upstream rejected generation: status {status}"));
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            http::build_json_error(status, "generation failed", Some(&body))
        }
        Err(err) => {
            logger::log_error(&err.to_string());
            http::build_json_error(
                StatusCode::BAD_GATEWAY,
                "upstream unreachable",
                Some(&err.to_string()),
            )
        }
    }
}

/// Translate a successful upstream response into the client reply
fn translate_success(response: &Value) -> Response<Full<Bytes>> {
    match gemini::extract_inline_image(response) {
        Some(image) => http::json_response(
            StatusCode::OK,
            &ImageReply {
                image_base64: &image.data,
                mime_type: image
                    .mime_type
                    .as_deref()
                    .unwrap_or(gemini::DEFAULT_IMAGE_MIME),
            },
        ),
        None => http::json_response(
            StatusCode::OK,
            &InfoReply {
                message: "no image returned",
                raw: response,
            },
        ),
    }
}
