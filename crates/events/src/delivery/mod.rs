//! External delivery channels.
//!
//! - [`report`]: archival of settled comparison runs.

pub mod report;
