//! The single chokepoint every handle method sends its requests through.
//!
//! # Design
//! `Dispatcher` splits each round trip into a `build_request` step that turns
//! a [`RequestDescription`] into a wire-ready `HttpRequest`, a transport call,
//! and a `parse_response` step that decodes the body and classifies it. Both
//! pure steps are public so they can be checked without a transport.
//!
//! `send` runs the round trip off the caller's thread and reports the outcome
//! to the continuation exactly once:
//! - transport failure → `Err(CouchError::Transport)`
//! - body is not JSON → `Err(CouchError::Decode)`
//! - JSON object with a truthy `error` field → `Err(CouchError::Domain)`
//! - anything else → `Ok(value)`
//!
//! HTTP status codes are never consulted. There is no retry, timeout, or
//! cancellation; a transport that never returns never completes the call.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::config::Settings;
use crate::error::{CouchError, DomainError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// One request to send, independent of any connection.
///
/// `method` is kept as raw text; unknown or absent verbs are sent as `GET`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescription {
    pub method: Option<String>,
    /// Server-relative path without a leading `/`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestDescription {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.as_str().to_string()),
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.method = Some(verb.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Sends requests for one connection.
#[derive(Clone)]
pub struct Dispatcher {
    settings: Arc<Settings>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings: Arc::new(settings),
            transport,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn build_request(&self, description: &RequestDescription) -> Result<HttpRequest, CouchError> {
        let method = HttpMethod::from_verb(description.method.as_deref());
        let body = description
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(CouchError::Encode)?;

        let mut headers = self.default_headers();
        for (name, value) in &description.headers {
            merge_header(&mut headers, name, value);
        }

        Ok(HttpRequest {
            method,
            host: self.settings.host.clone(),
            port: self.settings.port,
            path: format!("/{}", description.path),
            headers,
            body,
        })
    }

    fn default_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        if self.settings.has_credentials() {
            let pair = format!("{}:{}", self.settings.username, self.settings.password);
            headers.push(("Authorization".to_string(), format!("Basic {}", STANDARD.encode(pair))));
        }
        headers
    }

    /// Decode a buffered response and split domain errors from success values.
    pub fn parse_response(response: HttpResponse) -> Result<Value, CouchError> {
        let value: Value = serde_json::from_str(&response.body).map_err(CouchError::Decode)?;
        match value {
            Value::Object(map) if map.get("error").is_some_and(is_truthy) => {
                Err(CouchError::Domain(DomainError::new(map)))
            }
            other => Ok(other),
        }
    }

    /// Build, execute, and parse one request on the current thread.
    pub fn round_trip(&self, description: &RequestDescription) -> Result<Value, CouchError> {
        let request = self.build_request(description)?;
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            has_body = request.body.is_some(),
            "dispatching request"
        );

        let response = self.transport.execute(request).map_err(|e| {
            tracing::warn!(error = %e, path = %description.path, "transport failure");
            CouchError::Transport(e)
        })?;

        let status = response.status;
        match Self::parse_response(response) {
            Err(CouchError::Domain(err)) => {
                tracing::debug!(status, error = %err.error(), path = %description.path, "server returned an error envelope");
                Err(CouchError::Domain(err))
            }
            Err(err) => {
                tracing::warn!(status, error = %err, path = %description.path, "response could not be decoded");
                Err(err)
            }
            ok => ok,
        }
    }

    /// Dispatch without blocking; `continuation` receives the outcome.
    pub fn send<F>(&self, description: RequestDescription, continuation: F)
    where
        F: FnOnce(Result<Value, CouchError>) + Send + 'static,
    {
        let dispatcher = self.clone();
        spawn(move || continuation(dispatcher.round_trip(&description)));
    }
}

/// Report an outcome decided before dispatch, such as an argument error.
///
/// Delivered on the same kind of worker a round trip completes on, never on
/// the caller's thread.
pub(crate) fn reject<T, F>(callback: F, err: CouchError)
where
    F: FnOnce(Result<T, CouchError>) + Send + 'static,
{
    spawn(move || callback(Err(err)));
}

/// Run `job` on tokio's blocking pool when inside a runtime, else on a fresh thread.
fn spawn(job: impl FnOnce() + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(job);
        }
        Err(_) => {
            std::thread::spawn(job);
        }
    }
}

/// Caller headers replace defaults with the same name, compared case-insensitively.
fn merge_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(existing) => *existing = (name.to_string(), value.to_string()),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// JSON truthiness of an `error` field.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
