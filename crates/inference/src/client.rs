//! HTTP client for a vision model server.
//!
//! Speaks the `/api/generate` contract: the request carries the model
//! name, the prompt and base64-encoded images; a non-streaming reply
//! carries the generated text. A missing model is reported as
//! [`InferenceError::ModelNotFound`] so callers can tell the operator
//! which model to install.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use dronelens_core::capture::StillFrame;
use dronelens_core::comparison::ComparisonRequest;

use crate::endpoint::InferenceEndpoint;

/// Time allowed to establish a connection. The overall request is bounded
/// by the per-request timeout of the comparison run instead.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from an inference endpoint.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Inference API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Server error message, or the raw body.
        body: String,
    },

    /// The requested model is not installed on the server.
    #[error("Model '{model}' is not installed on the inference server. Install it with `ollama pull {model}` and try again")]
    ModelNotFound { model: String },

    /// The server answered 2xx with a body we could not use.
    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default, alias = "response")]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one model on one server.
pub struct InferenceApi {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

impl InferenceApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:11434`.
    /// * `model` - Model name as known to the server.
    pub fn new(api_url: impl Into<String>, model: impl Into<String>) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, api_url, model))
    }

    /// Create a client reusing an existing [`reqwest::Client`], so several
    /// models on one server share a connection pool.
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Generate a reply for `prompt` over `images` (`POST /api/generate`).
    pub async fn generate(&self, prompt: &str, images: &[StillFrame]) -> Result<String, InferenceError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: images.iter().map(|img| BASE64.encode(&img.data)).collect(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(self.classify_failure(status.as_u16(), &text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(self.classify_failure(status.as_u16(), &error));
        }
        parsed
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| InferenceError::MalformedResponse("response has no text".to_string()))
    }

    // ---- private helpers ----

    /// Turn a failed reply into an error, picking out the "model not found"
    /// case by status or by message.
    fn classify_failure(&self, status: u16, body: &str) -> InferenceError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| body.trim().to_string());

        let lower = message.to_lowercase();
        if status == 404 || (lower.contains("model") && lower.contains("not found")) {
            return InferenceError::ModelNotFound {
                model: self.model.clone(),
            };
        }
        InferenceError::ApiError {
            status,
            body: message,
        }
    }
}

#[async_trait]
impl InferenceEndpoint for InferenceApi {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn infer(&self, request: &ComparisonRequest) -> Result<String, InferenceError> {
        self.generate(&request.prompt, &request.images).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn images() -> [StillFrame; 2] {
        [StillFrame::jpeg(vec![1, 2, 3]), StillFrame::jpeg(vec![4])]
    }

    #[tokio::test]
    async fn sends_encoded_images_and_reads_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llava",
                "prompt": "compare",
                "images": ["AQID", "BA=="],
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llava",
                "response": "The drone moved left. Summary: moved left",
                "done": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "llava").unwrap();
        let text = api.generate("compare", &images()).await.unwrap();
        assert_eq!(text, "The drone moved left. Summary: moved left");
    }

    #[tokio::test]
    async fn accepts_text_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "A"})))
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "m").unwrap();
        assert_eq!(api.generate("p", &images()).await.unwrap(), "A");
    }

    #[tokio::test]
    async fn missing_model_names_the_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model \"bakllava\" not found, try pulling it first",
            })))
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "bakllava").unwrap();
        let err = api.generate("p", &images()).await.unwrap_err();
        assert_matches!(err, InferenceError::ModelNotFound { ref model } if model == "bakllava");
        assert!(err.to_string().contains("bakllava"));
    }

    #[tokio::test]
    async fn server_error_keeps_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "out of memory",
            })))
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "llava").unwrap();
        assert_matches!(
            api.generate("p", &images()).await,
            Err(InferenceError::ApiError { status: 500, ref body }) if body == "out of memory"
        );
    }

    #[tokio::test]
    async fn malformed_reply_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "llava").unwrap();
        assert_matches!(
            api.generate("p", &images()).await,
            Err(InferenceError::MalformedResponse(_))
        );
    }

    #[tokio::test]
    async fn empty_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "  "})))
            .mount(&server)
            .await;

        let api = InferenceApi::new(server.uri(), "llava").unwrap();
        assert_matches!(
            api.generate("p", &images()).await,
            Err(InferenceError::MalformedResponse(_))
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        let api = InferenceApi::new("http://127.0.0.1:1", "llava").unwrap();
        assert_matches!(
            api.generate("p", &images()).await,
            Err(InferenceError::Request(_))
        );
    }
}
