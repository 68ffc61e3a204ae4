//! Best-effort archival of settled comparison runs.
//!
//! [`ExternalReportSubmitter`] posts the two stills and the ordered
//! results of a run to the report endpoint. There is no retry: a failed
//! submission is reported as a [`ReportOutcome::Failed`] and the operator
//! may submit the same payload again.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use dronelens_core::comparison::ComparisonResult;
use dronelens_core::error::ReportError;
use dronelens_core::report::{ReportOutcome, ReportPayload, ReportSubmission};
use dronelens_core::types::RunId;

/// HTTP request timeout for a single submission.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EncodedImage {
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    run_id: RunId,
    images: Vec<EncodedImage>,
    results: &'a [ComparisonResult],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    success: bool,
    #[serde(default, alias = "reference_url")]
    reference_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl<'a> ReportRequest<'a> {
    fn from_payload(payload: &'a ReportPayload) -> Self {
        let images = payload
            .images
            .iter()
            .map(|frame| EncodedImage {
                media_type: frame.media_type.clone(),
                data: BASE64.encode(&frame.data),
            })
            .collect();
        Self {
            run_id: payload.run_id,
            images,
            results: &payload.results,
        }
    }
}

// ---------------------------------------------------------------------------
// ReportSink
// ---------------------------------------------------------------------------

/// Destination for archived runs.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Submit one run. Returns the archive's reference URL, if it gave one.
    async fn submit(&self, payload: &ReportPayload) -> Result<Option<String>, ReportError>;
}

/// Submit `payload` and turn the result into a [`ReportSubmission`].
///
/// Never fails: a transport or rejection error becomes a
/// [`ReportOutcome::Failed`] record.
pub async fn submit_and_record(sink: &dyn ReportSink, payload: &ReportPayload) -> ReportSubmission {
    let outcome = match sink.submit(payload).await {
        Ok(reference_url) => {
            tracing::info!(run_id = %payload.run_id, ?reference_url, "Report submitted");
            ReportOutcome::Success { reference_url }
        }
        Err(e) => {
            tracing::warn!(run_id = %payload.run_id, error = %e, "Report submission failed");
            ReportOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };

    ReportSubmission {
        run_id: payload.run_id,
        image_count: payload.images.len(),
        result_count: payload.results.len(),
        outcome,
        submitted_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// ExternalReportSubmitter
// ---------------------------------------------------------------------------

/// HTTP client for the archival report endpoint.
pub struct ExternalReportSubmitter {
    client: reqwest::Client,
    url: String,
}

impl ExternalReportSubmitter {
    /// Create a submitter posting to `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReportError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute a single POST request and interpret the response envelope.
    async fn try_send(&self, payload: &ReportPayload) -> Result<Option<String>, ReportError> {
        let body = ReportRequest::from_payload(payload);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        match serde_json::from_str::<ReportResponse>(&text) {
            Ok(parsed) if parsed.success && status.is_success() => Ok(parsed.reference_url),
            Ok(parsed) => Err(ReportError::Rejected(
                parsed
                    .error
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            )),
            Err(_) if !status.is_success() => {
                Err(ReportError::Rejected(format!("HTTP {}", status.as_u16())))
            }
            Err(e) => Err(ReportError::Transport(format!("Malformed response: {e}"))),
        }
    }
}

#[async_trait]
impl ReportSink for ExternalReportSubmitter {
    async fn submit(&self, payload: &ReportPayload) -> Result<Option<String>, ReportError> {
        tracing::debug!(run_id = %payload.run_id, url = %self.url, "Submitting report");
        self.try_send(payload).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use dronelens_core::capture::StillFrame;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn payload() -> ReportPayload {
        ReportPayload {
            run_id: RunId::nil(),
            images: [StillFrame::jpeg(vec![1, 2, 3]), StillFrame::jpeg(vec![4])],
            results: vec![ComparisonResult::success("llava", "A", Duration::ZERO)],
        }
    }

    #[tokio::test]
    async fn success_returns_reference_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/report"))
            .and(body_partial_json(serde_json::json!({
                "images": [{"media_type": "image/jpeg", "data": "AQID"}, {"media_type": "image/jpeg", "data": "BA=="}],
                "results": [{"model_id": "llava", "status": "success", "text": "A"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "referenceUrl": "https://archive.example/r/1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let submitter = ExternalReportSubmitter::new(format!("{}/api/report", server.uri())).unwrap();
        let url = submitter.submit(&payload()).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://archive.example/r/1"));
    }

    #[tokio::test]
    async fn success_false_is_rejected_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "error": "quota exceeded",
            })))
            .mount(&server)
            .await;

        let submitter = ExternalReportSubmitter::new(server.uri()).unwrap();
        let err = submitter.submit(&payload()).await.unwrap_err();
        assert_eq!(err, ReportError::Rejected("quota exceeded".into()));
    }

    #[tokio::test]
    async fn non_json_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let submitter = ExternalReportSubmitter::new(server.uri()).unwrap();
        let err = submitter.submit(&payload()).await.unwrap_err();
        assert_eq!(err, ReportError::Rejected("HTTP 502".into()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let submitter = ExternalReportSubmitter::new("http://127.0.0.1:1/report").unwrap();
        let err = submitter.submit(&payload()).await.unwrap_err();
        assert_matches!(err, ReportError::Transport(_));
    }

    #[tokio::test]
    async fn submit_and_record_never_fails() {
        let submitter = ExternalReportSubmitter::new("http://127.0.0.1:1/report").unwrap();
        let record = submit_and_record(&submitter, &payload()).await;
        assert!(!record.outcome.is_success());
        assert_eq!(record.image_count, 2);
        assert_eq!(record.result_count, 1);
    }

    #[tokio::test]
    async fn resubmitting_same_payload_is_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let submitter = ExternalReportSubmitter::new(server.uri()).unwrap();
        let payload = payload();
        assert_eq!(submitter.submit(&payload).await.unwrap(), None);
        assert_eq!(submitter.submit(&payload).await.unwrap(), None);
    }
}
