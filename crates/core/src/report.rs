//! Archival report payload and outcome.

use serde::{Deserialize, Serialize};

use crate::capture::StillFrame;
use crate::comparison::{ComparisonResult, ComparisonRun, RunPhase};
use crate::types::{RunId, Timestamp};

/// What gets archived for one settled run.
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub run_id: RunId,
    pub images: [StillFrame; 2],
    pub results: Vec<ComparisonResult>,
}

impl ReportPayload {
    /// Build the payload for a settled run. Returns `None` for runs that
    /// have not settled yet.
    pub fn from_run(run: &ComparisonRun) -> Option<Self> {
        if run.phase() != RunPhase::Settled {
            return None;
        }
        Some(Self {
            run_id: run.id(),
            images: run.images()?.clone(),
            results: run.results().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    Success { reference_url: Option<String> },
    Failed { reason: String },
}

impl ReportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Record of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSubmission {
    pub run_id: RunId,
    pub image_count: usize,
    pub result_count: usize,
    #[serde(flatten)]
    pub outcome: ReportOutcome,
    pub submitted_at: Timestamp,
}
