//! Concurrent multi-model comparison.
//!
//! [`ComparisonOrchestrator::trigger`] takes the buffered pair of stills,
//! sends one request per configured endpoint at the same time, and waits
//! until every request has succeeded, failed or timed out. Failures and
//! timeouts are recorded as results; they never abort the run or delay
//! the other requests. Results come back in endpoint order.

use std::sync::Arc;
use std::time::Duration;

use dronelens_core::capture::CaptureBuffer;
use dronelens_core::comparison::{
    ComparisonRequest, ComparisonResult, ComparisonRun, DEFAULT_REQUEST_TIMEOUT,
};
use dronelens_core::error::ComparisonError;
use dronelens_core::settle::{settle_all, Outcome};
use dronelens_events::{EventBus, EventKind};

use crate::endpoint::InferenceEndpoint;

/// Prompt used when none is configured. Ends with a request for a
/// one-line summary, which narration reads aloud.
pub const DEFAULT_PROMPT: &str = "Compare these two images taken from a drone. \
What are the key differences between them? What changes do you notice in position, \
objects, lighting, or any other aspects? Please be specific and detailed. \
Finish with one line that starts with \"Summary:\" and states the main change in under ten words.";

pub struct ComparisonOrchestrator {
    endpoints: Vec<Arc<dyn InferenceEndpoint>>,
    prompt: String,
    timeout: Duration,
    bus: Option<Arc<EventBus>>,
}

impl ComparisonOrchestrator {
    pub fn new(endpoints: Vec<Arc<dyn InferenceEndpoint>>) -> Self {
        Self {
            endpoints,
            prompt: DEFAULT_PROMPT.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            bus: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Per-request time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn models(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.model_id().to_string()).collect()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Compare the two buffered stills on every endpoint and return the
    /// settled run.
    ///
    /// Fails without creating a run if either slot is empty or no endpoint
    /// is configured.
    pub async fn trigger(&self, buffer: &CaptureBuffer) -> Result<ComparisonRun, ComparisonError> {
        let images = buffer.pair().ok_or(ComparisonError::InsufficientInput)?;
        if self.endpoints.is_empty() {
            return Err(ComparisonError::NoEndpoints);
        }

        let requests = self
            .endpoints
            .iter()
            .map(|endpoint| ComparisonRequest {
                model_id: endpoint.model_id().to_string(),
                prompt: self.prompt.clone(),
                images: images.clone(),
                timeout: self.timeout,
            })
            .collect();

        let mut run = ComparisonRun::new(requests);
        run.start()?;

        let models = self.models();
        tracing::info!(
            run_id = %run.id(),
            models = ?models,
            timeout_secs = self.timeout.as_secs(),
            "Comparison started",
        );
        self.publish(EventKind::RunStarted {
            run_id: run.id(),
            models: models.clone(),
        });

        let settled = settle_all(
            self.endpoints
                .iter()
                .zip(run.requests())
                .map(|(endpoint, request)| (endpoint.infer(request), request.timeout)),
        )
        .await;

        for (index, (settled, model)) in settled.into_iter().zip(&models).enumerate() {
            let result = match settled.outcome {
                Outcome::Ok(text) => {
                    tracing::info!(
                        model = %model,
                        elapsed_ms = settled.elapsed.as_millis() as u64,
                        "Model replied",
                    );
                    ComparisonResult::success(model, text, settled.elapsed)
                }
                Outcome::Err(e) => {
                    tracing::warn!(model = %model, error = %e, "Model request failed");
                    ComparisonResult::failure(model, e.to_string(), settled.elapsed)
                }
                Outcome::TimedOut(limit) => {
                    tracing::warn!(model = %model, limit_secs = limit.as_secs(), "Model request timed out");
                    ComparisonResult::timeout(model, limit)
                }
            };
            run.record(index, result)?;
        }
        run.settle()?;

        if let Some(outcome) = run.outcome() {
            tracing::info!(run_id = %run.id(), outcome = ?outcome, "Comparison settled");
            self.publish(EventKind::RunSettled {
                run_id: run.id(),
                outcome,
                results: run.results().to_vec(),
            });
        }
        Ok(run)
    }

    fn publish(&self, kind: EventKind) {
        if let Some(bus) = &self.bus {
            bus.publish(kind);
        }
    }
}
