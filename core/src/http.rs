//! HTTP request/response values exchanged with a [`Transport`](crate::Transport).
//!
//! # Design
//! Requests and responses are plain data. The dispatcher builds an
//! `HttpRequest`, hands it to a transport, and parses whatever `HttpResponse`
//! comes back. Keeping the wire shape as data means the dispatch logic can be
//! exercised against a stub transport without a socket.

use std::fmt;

/// HTTP verb understood by the database server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Head,
    Copy,
}

impl HttpMethod {
    /// Parse a verb case-insensitively.
    ///
    /// Absent or unrecognized verbs fall back to `Get` without reporting a
    /// failure.
    pub fn from_verb(verb: Option<&str>) -> Self {
        let Some(verb) = verb else {
            return HttpMethod::Get;
        };
        match verb.to_ascii_uppercase().as_str() {
            "PUT" => HttpMethod::Put,
            "POST" => HttpMethod::Post,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "COPY" => HttpMethod::Copy,
            _ => HttpMethod::Get,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Copy => "COPY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound HTTP request described as plain data.
///
/// `path` is the exact path written on the wire, always starting with `/`
/// and already carrying any encoded query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Absolute URL for transports that address requests by URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}
