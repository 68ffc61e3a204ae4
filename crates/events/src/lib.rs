//! dronelens event bus and archival delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying [`Event`]s from the session,
//!   orchestrator, narration and report paths to any observer.
//! - [`delivery`]: best-effort archival of settled comparison runs.

pub mod bus;
pub mod delivery;

pub use bus::{Event, EventBus, EventKind};
pub use delivery::report::{submit_and_record, ExternalReportSubmitter, ReportSink};
