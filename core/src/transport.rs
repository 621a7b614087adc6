//! The seam between request dispatch and the network.
//!
//! # Design
//! A `Transport` turns one `HttpRequest` into one fully buffered
//! `HttpResponse`. It never interprets status codes: a 404 with a JSON error
//! envelope is a perfectly good response. `UreqTransport` is the production
//! implementation; tests plug in stubs that record requests and replay canned
//! bodies.

use ureq::http;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse};

/// Executes a single HTTP round-trip.
///
/// Implementations may block; the dispatcher always calls them off the
/// caller's thread.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a shared `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url();
        let method = http::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::with_source(format!("invalid method {}", request.method), e))?;

        let mut builder = http::Request::builder().method(method).uri(url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let outcome = match request.body {
            Some(body) => {
                let prepared = builder
                    .body(body.into_bytes())
                    .map_err(|e| TransportError::with_source(format!("invalid request for {url}"), e))?;
                self.agent.run(prepared)
            }
            None => {
                let prepared = builder
                    .body(())
                    .map_err(|e| TransportError::with_source(format!("invalid request for {url}"), e))?;
                self.agent.run(prepared)
            }
        };
        let mut response = outcome.map_err(|e| TransportError::with_source(format!("request to {url} failed"), e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::with_source(format!("reading response from {url} failed"), e))?;

        Ok(HttpResponse { status, headers, body })
    }
}
