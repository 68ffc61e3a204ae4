//! Multi-model comparison run model.
//!
//! A [`ComparisonRun`] moves `Pending -> Running -> Settled`. While
//! running, each request's result is recorded into its own position;
//! settling freezes the run and fixes the result order to the request
//! order, whatever order the results arrived in.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::capture::StillFrame;
use crate::error::RunStateError;
use crate::types::{RunId, Timestamp};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix on the display text of every non-success result.
pub const ERROR_TEXT_PREFIX: &str = "Error";

/// One inference request over the buffered pair of stills.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub model_id: String,
    pub prompt: String,
    pub images: [StillFrame; 2],
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
    Timeout,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        })
    }
}

/// Settled outcome of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub model_id: String,
    pub status: ResultStatus,
    /// Model output on success; a short `Error: ...` line otherwise.
    pub text: String,
    pub error_detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ComparisonResult {
    pub fn success(model_id: impl Into<String>, text: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            model_id: model_id.into(),
            status: ResultStatus::Success,
            text: text.into(),
            error_detail: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failure(model_id: impl Into<String>, detail: impl Into<String>, elapsed: Duration) -> Self {
        let detail = detail.into();
        Self {
            model_id: model_id.into(),
            status: ResultStatus::Failure,
            text: format!("{ERROR_TEXT_PREFIX}: {detail}"),
            error_detail: Some(detail),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn timeout(model_id: impl Into<String>, limit: Duration) -> Self {
        let detail = format!("No response within {}s", limit.as_secs());
        Self {
            model_id: model_id.into(),
            status: ResultStatus::Timeout,
            text: format!("{ERROR_TEXT_PREFIX}: {detail}"),
            error_detail: Some(detail),
            elapsed_ms: limit.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pending,
    Running,
    Settled,
}

/// Classification of a settled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    AllSucceeded,
    /// At least one success and at least one failure or timeout.
    Partial,
    AllFailed,
}

impl RunOutcome {
    fn classify(results: &[ComparisonResult]) -> Self {
        let successes = results.iter().filter(|r| r.is_success()).count();
        match successes {
            n if n == results.len() => Self::AllSucceeded,
            0 => Self::AllFailed,
            _ => Self::Partial,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonRun {
    id: RunId,
    created_at: Timestamp,
    settled_at: Option<Timestamp>,
    requests: Vec<ComparisonRequest>,
    pending: Vec<Option<ComparisonResult>>,
    results: Vec<ComparisonResult>,
    phase: RunPhase,
    outcome: Option<RunOutcome>,
}

impl ComparisonRun {
    pub fn new(requests: Vec<ComparisonRequest>) -> Self {
        let pending = vec![None; requests.len()];
        Self {
            id: uuid::Uuid::new_v4(),
            created_at: Utc::now(),
            settled_at: None,
            requests,
            pending,
            results: Vec::new(),
            phase: RunPhase::Pending,
            outcome: None,
        }
    }

    pub fn start(&mut self) -> Result<(), RunStateError> {
        match self.phase {
            RunPhase::Pending => {
                self.phase = RunPhase::Running;
                Ok(())
            }
            RunPhase::Running => Ok(()),
            RunPhase::Settled => Err(RunStateError::AlreadySettled),
        }
    }

    /// Record the result for the request at `index`.
    pub fn record(&mut self, index: usize, result: ComparisonResult) -> Result<(), RunStateError> {
        match self.phase {
            RunPhase::Running => {}
            RunPhase::Pending => return Err(RunStateError::NotRunning),
            RunPhase::Settled => return Err(RunStateError::AlreadySettled),
        }
        let len = self.pending.len();
        let entry = self
            .pending
            .get_mut(index)
            .ok_or(RunStateError::IndexOutOfRange { index, len })?;
        if entry.is_some() {
            return Err(RunStateError::DuplicateResult(index));
        }
        *entry = Some(result);
        Ok(())
    }

    /// Freeze the run. Every request must have a recorded result.
    pub fn settle(&mut self) -> Result<(), RunStateError> {
        match self.phase {
            RunPhase::Running => {}
            RunPhase::Pending => return Err(RunStateError::NotRunning),
            RunPhase::Settled => return Err(RunStateError::AlreadySettled),
        }
        let missing = self.pending.iter().filter(|r| r.is_none()).count();
        if missing > 0 {
            return Err(RunStateError::Incomplete { missing });
        }

        self.results = self.pending.drain(..).flatten().collect();
        self.outcome = Some(RunOutcome::classify(&self.results));
        self.phase = RunPhase::Settled;
        self.settled_at = Some(Utc::now());
        Ok(())
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn settled_at(&self) -> Option<Timestamp> {
        self.settled_at
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn requests(&self) -> &[ComparisonRequest] {
        &self.requests
    }

    /// Results in request order. Empty until the run settles.
    pub fn results(&self) -> &[ComparisonResult] {
        &self.results
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// True only for a settled run in which every request succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.outcome == Some(RunOutcome::AllSucceeded)
    }

    /// The pair of stills the run compared.
    pub fn images(&self) -> Option<&[StillFrame; 2]> {
        self.requests.first().map(|r| &r.images)
    }
}
