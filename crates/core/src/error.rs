//! Error taxonomy.
//!
//! Connection, stream and capture errors surface as session status and
//! are recoverable by retrying the operation. Per-model comparison
//! failures are never errors: they are recorded on the
//! [`ComparisonResult`](crate::comparison::ComparisonResult).

use crate::session::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),

    /// `connect` is only valid from `Disconnected`.
    #[error("Cannot connect while {0}")]
    InvalidState(ConnectionState),

    /// The backend kind can only be switched while disconnected.
    #[error("Cannot switch backend while {0}")]
    BackendLocked(ConnectionState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Not connected")]
    NotConnected,

    #[error("Stream failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No live frame is available yet (not streaming, or the source has
    /// not produced a frame).
    #[error("No live frame available yet")]
    NotReady,

    #[error("Capture failed: {0}")]
    Device(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComparisonError {
    #[error("Both photos must be captured before comparing")]
    InsufficientInput,

    #[error("No inference endpoints configured")]
    NoEndpoints,

    #[error(transparent)]
    RunState(#[from] RunStateError),
}

/// Violations of the [`ComparisonRun`](crate::comparison::ComparisonRun)
/// lifecycle. These indicate a programming error in the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStateError {
    #[error("Run is already settled")]
    AlreadySettled,

    #[error("Run has not started")]
    NotRunning,

    #[error("Result index {index} out of range for {len} requests")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Result {0} already recorded")]
    DuplicateResult(usize),

    #[error("{missing} request(s) have not settled")]
    Incomplete { missing: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The device refused the command. Carries its reason verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Command transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("Report transport failed: {0}")]
    Transport(String),

    #[error("Report rejected: {0}")]
    Rejected(String),
}
