//! REST client for the device control service.
//!
//! The service fronts the flight-capable camera: it connects to the
//! device, relays its status, runs the video stream, stores stills and
//! forwards flight commands. Every JSON endpoint answers with an envelope
//! of the form `{success, ...}` or `{success: false, error}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use dronelens_core::capture::{StillFrame, DEFAULT_MEDIA_TYPE};
use dronelens_core::error::CommandError;
use dronelens_core::flight::FlightCommand;
use dronelens_core::session::Telemetry;

/// Timeout applied to every control request. Flight commands block on the
/// device until the manoeuvre completes, so this is generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one device control service.
pub struct DeviceApi {
    client: reqwest::Client,
    api_url: String,
}

/// Generic `{success, error}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    status: Option<serde_json::Value>,
}

/// Errors from the device control REST layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status without an error envelope.
    #[error("Device service error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered `{success: false, error}`.
    #[error("{0}")]
    Rejected(String),
}

impl DeviceApi {
    /// Create a new client for a device control service.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:3001`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, DeviceApiError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Ask the service to connect to the device (`POST /api/connect`).
    pub async fn connect(&self) -> Result<(), DeviceApiError> {
        self.post_action("connect", None).await.map(|_| ())
    }

    /// Poll device status (`GET /api/status`).
    ///
    /// Returns `None` when the service has no status to report.
    pub async fn status(&self) -> Result<Option<Telemetry>, DeviceApiError> {
        let response = self
            .client
            .get(format!("{}/api/status", self.api_url))
            .send()
            .await?;
        let envelope = Self::parse_envelope(response).await?;
        Ok(envelope.status.as_ref().and_then(parse_telemetry))
    }

    /// Begin streaming video (`POST /api/start-stream`).
    pub async fn start_stream(&self) -> Result<(), DeviceApiError> {
        self.post_action("start-stream", None).await.map(|_| ())
    }

    /// Stop streaming video (`POST /api/stop-stream`).
    pub async fn stop_stream(&self) -> Result<(), DeviceApiError> {
        self.post_action("stop-stream", None).await.map(|_| ())
    }

    /// URL of the continuous MJPEG feed. The timestamp defeats caching of a
    /// previous stream by renderers.
    pub fn feed_url(&self) -> String {
        format!(
            "{}/api/video-feed?t={}",
            self.api_url,
            chrono::Utc::now().timestamp_millis()
        )
    }

    /// Store the current frame under `filename` (`POST /api/capture`).
    pub async fn capture(&self, filename: &str) -> Result<(), DeviceApiError> {
        let body = serde_json::json!({ "filename": filename });
        self.post_action("capture", Some(&body)).await.map(|_| ())
    }

    /// Download a stored still (`GET /api/photo/{filename}`).
    pub async fn fetch_photo(&self, filename: &str) -> Result<StillFrame, DeviceApiError> {
        let response = self
            .client
            .get(format!("{}/api/photo/{}", self.api_url, filename))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();
        let bytes = response.bytes().await?;
        Ok(StillFrame::new(bytes.to_vec(), media_type))
    }

    /// Release the device (`POST /api/disconnect`).
    pub async fn disconnect(&self) -> Result<(), DeviceApiError> {
        self.post_action("disconnect", None).await.map(|_| ())
    }

    /// Send one flight command. Blocks until the service answers.
    pub async fn command(&self, command: &FlightCommand) -> Result<(), DeviceApiError> {
        self.post_action(command.endpoint(), command.body().as_ref())
            .await
            .map(|_| ())
    }

    // ---- private helpers ----

    async fn post_action(
        &self,
        action: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Envelope, DeviceApiError> {
        let mut request = self.client.post(format!("{}/api/{}", self.api_url, action));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::parse_envelope(response).await
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`DeviceApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DeviceApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(match serde_json::from_str::<Envelope>(&body) {
                Ok(Envelope {
                    error: Some(error), ..
                }) => DeviceApiError::Rejected(error),
                _ => DeviceApiError::ApiError {
                    status: status.as_u16(),
                    body,
                },
            });
        }
        Ok(response)
    }

    /// Parse the `{success, ...}` envelope, turning `success: false` into
    /// [`DeviceApiError::Rejected`].
    async fn parse_envelope(response: reqwest::Response) -> Result<Envelope, DeviceApiError> {
        let response = Self::ensure_success(response).await?;
        let envelope = response.json::<Envelope>().await?;
        if !envelope.success {
            return Err(DeviceApiError::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "Device reported failure".to_string()),
            ));
        }
        Ok(envelope)
    }
}

/// Extract battery and WiFi signal from the service's status object.
///
/// Either field may be missing or oddly typed; missing fields are simply
/// left empty.
fn parse_telemetry(status: &serde_json::Value) -> Option<Telemetry> {
    let battery = status
        .get("battery")
        .and_then(as_i64)
        .map(|b| b.clamp(0, 100) as u8);
    let signal = status
        .get("wifi")
        .or_else(|| status.get("signal"))
        .and_then(as_i64)
        .and_then(|s| i32::try_from(s).ok());

    let telemetry = Telemetry { battery, signal };
    (!telemetry.is_empty()).then_some(telemetry)
}

fn as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// FlightControl
// ---------------------------------------------------------------------------

/// Channel that moves the physical device.
#[async_trait]
pub trait FlightControl: Send + Sync {
    async fn send(&self, command: &FlightCommand) -> Result<(), CommandError>;
}

#[async_trait]
impl FlightControl for DeviceApi {
    async fn send(&self, command: &FlightCommand) -> Result<(), CommandError> {
        self.command(command).await.map_err(|e| match e {
            DeviceApiError::Rejected(reason) => CommandError::Rejected(reason),
            other => CommandError::Transport(other.to_string()),
        })
    }
}
