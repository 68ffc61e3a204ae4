//! Vision model endpoints and the comparison orchestrator.

pub mod client;
pub mod endpoint;
pub mod orchestrator;

pub use client::{InferenceApi, InferenceError};
pub use endpoint::{parse_endpoint_list, EndpointSpec, EndpointSpecError, InferenceEndpoint};
pub use orchestrator::{ComparisonOrchestrator, DEFAULT_PROMPT};
