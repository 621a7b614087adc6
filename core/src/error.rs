//! Error types for the database client.
//!
//! # Design
//! Every continuation receives a `CouchError`. Transport failures, undecodable
//! bodies, and server-side error envelopes share that one type so handle
//! methods can forward any failure untouched. A domain error keeps the whole
//! parsed response object; callers inspect its `error` field for finer
//! classification.

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure raised by a [`Transport`](crate::Transport) before any response
/// body was received.
#[derive(Debug, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A response that decoded cleanly but carried a truthy `error` field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", summarize(&self.body))]
pub struct DomainError {
    body: Map<String, Value>,
}

impl DomainError {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    /// The `error` field as text, e.g. `"not_found"` or `"conflict"`.
    pub fn error(&self) -> String {
        error_kind(&self.body)
    }

    pub fn reason(&self) -> Option<&str> {
        self.body.get("reason").and_then(Value::as_str)
    }

    pub fn is_not_found(&self) -> bool {
        self.error() == "not_found"
    }

    pub fn is_conflict(&self) -> bool {
        self.error() == "conflict"
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_body(self) -> Map<String, Value> {
        self.body
    }
}

fn error_kind(body: &Map<String, Value>) -> String {
    match body.get("error") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// `error: reason`, or the bare error kind when no reason was sent.
fn summarize(body: &Map<String, Value>) -> String {
    let kind = error_kind(body);
    match body.get("reason").and_then(Value::as_str) {
        Some(reason) => format!("{kind}: {reason}"),
        None => kind,
    }
}

/// The Argument Resolver could not bind a call's arguments to its slots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// No unfilled slot accepts an argument of this shape.
    #[error("argument {position} ({shape}) does not fit any remaining parameter")]
    Unexpected { position: usize, shape: &'static str },

    /// A required slot received no argument.
    #[error("missing required argument `{slot}`")]
    Missing { slot: &'static str },
}

/// Errors delivered to every continuation.
#[derive(Debug, Error)]
pub enum CouchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body was not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// The server answered with an `error` envelope.
    #[error("server error {0}")]
    Domain(DomainError),

    /// The request body could not be serialized.
    #[error("request body could not be serialized: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Arguments(#[from] ArgumentError),

    /// A success response lacked a field needed to build the result.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl CouchError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            CouchError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(DomainError::is_not_found)
    }
}

/// Invalid process-wide client defaults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{variable} must be a valid port number, got {value:?}")]
    InvalidPort { variable: &'static str, value: String },

    #[error("{variable} must be a boolean flag, got {value:?}")]
    InvalidFlag { variable: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn domain(value: Value) -> DomainError {
        match value {
            Value::Object(map) => DomainError::new(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn domain_error_exposes_kind_and_reason() {
        let err = domain(json!({"error": "not_found", "reason": "missing"}));
        assert_eq!(err.error(), "not_found");
        assert_eq!(err.reason(), Some("missing"));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "not_found: missing");
    }

    #[test]
    fn non_string_error_field_is_rendered_as_json() {
        let err = domain(json!({"error": true}));
        assert_eq!(err.error(), "true");
        assert_eq!(err.reason(), None);
        assert_eq!(err.to_string(), "true");
    }

    #[test]
    fn domain_error_display_flows_through_couch_error() {
        let err = CouchError::Domain(domain(json!({"error": "conflict"})));
        assert_eq!(err.to_string(), "server error conflict");
        let source = std::error::Error::source(err.domain().unwrap());
        assert!(source.is_none());
    }

    #[test]
    fn couch_error_not_found_only_matches_domain_errors() {
        let err = CouchError::Domain(domain(json!({"error": "not_found"})));
        assert!(err.is_not_found());
        assert!(!CouchError::Transport(TransportError::new("refused")).is_not_found());
    }

    #[test]
    fn transport_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::with_source("connect to 127.0.0.1:1", io);
        assert_eq!(err.message(), "connect to 127.0.0.1:1");
        assert!(std::error::Error::source(&err).is_some());
    }
}
