//! Domain types shared by every dronelens crate.
//!
//! Nothing in here performs I/O. The device, inference, narration and
//! console crates build on these types:
//!
//! - [`session`]: backend kinds, connection/stream states, telemetry.
//! - [`capture`]: the two-slot [`CaptureBuffer`](capture::CaptureBuffer).
//! - [`comparison`]: requests, per-model results and the
//!   [`ComparisonRun`](comparison::ComparisonRun) lifecycle.
//! - [`settle`]: the wait-for-all join primitive used by the orchestrator.
//! - [`summary`]: spoken-summary extraction for narration.
//! - [`flight`]: flight command model.
//! - [`report`]: archival submission payload.
//! - [`error`]: the error taxonomy.

pub mod capture;
pub mod comparison;
pub mod error;
pub mod flight;
pub mod report;
pub mod session;
pub mod settle;
pub mod summary;
pub mod types;
