//! Operator console for the drone camera workbench.
//!
//! The binary reads commands from stdin and drives a [`Workbench`]; the
//! library half exists so the end-to-end scenarios can drive the same
//! controller from tests.

pub mod command;
pub mod config;
pub mod render;
pub mod workbench;

pub use command::{ConsoleCommand, ParseError};
pub use config::{ConfigError, ConsoleConfig};
pub use workbench::{Components, Reply, Workbench, WorkbenchError};
