//! Inference endpoint contract and endpoint list parsing.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use dronelens_core::comparison::ComparisonRequest;

use crate::client::InferenceError;

/// A model that can compare two stills against a prompt.
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    /// Identifier reported with every result, usually the model name.
    fn model_id(&self) -> &str;

    /// Run one request to completion. Time limits are applied by the caller.
    async fn infer(&self, request: &ComparisonRequest) -> Result<String, InferenceError>;
}

/// `model@base_url` pair naming one inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointSpecError {
    #[error("Endpoint '{0}' must have the form model@http://host:port")]
    Malformed(String),

    #[error("Endpoint list is empty")]
    Empty,
}

impl FromStr for EndpointSpec {
    type Err = EndpointSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (model, base_url) = trimmed
            .split_once('@')
            .ok_or_else(|| EndpointSpecError::Malformed(trimmed.to_string()))?;
        let (model, base_url) = (model.trim(), base_url.trim());
        let has_scheme = base_url.starts_with("http://") || base_url.starts_with("https://");
        if model.is_empty() || !has_scheme {
            return Err(EndpointSpecError::Malformed(trimmed.to_string()));
        }
        Ok(Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model, self.base_url)
    }
}

/// Parse a comma-separated endpoint list, keeping its order.
pub fn parse_endpoint_list(list: &str) -> Result<Vec<EndpointSpec>, EndpointSpecError> {
    let specs = list
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<EndpointSpec>, _>>()?;
    if specs.is_empty() {
        return Err(EndpointSpecError::Empty);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_list_in_order() {
        let specs =
            parse_endpoint_list("llava@http://a:11434/, moondream@https://b").unwrap();
        assert_eq!(
            specs,
            vec![
                EndpointSpec {
                    model: "llava".into(),
                    base_url: "http://a:11434".into(),
                },
                EndpointSpec {
                    model: "moondream".into(),
                    base_url: "https://b".into(),
                },
            ]
        );
    }

    #[test]
    fn model_tags_with_colons_survive() {
        let spec: EndpointSpec = "llama3.2-vision:11b@http://gpu:11434".parse().unwrap();
        assert_eq!(spec.model, "llama3.2-vision:11b");
        assert_eq!(spec.to_string(), "llama3.2-vision:11b@http://gpu:11434");
    }

    #[test]
    fn rejects_missing_parts() {
        assert_matches!("llava".parse::<EndpointSpec>(), Err(EndpointSpecError::Malformed(_)));
        assert_matches!("@http://a".parse::<EndpointSpec>(), Err(EndpointSpecError::Malformed(_)));
        assert_matches!("llava@a:1".parse::<EndpointSpec>(), Err(EndpointSpecError::Malformed(_)));
        assert_eq!(parse_endpoint_list(" , "), Err(EndpointSpecError::Empty));
    }
}
