//! Client for a document-oriented HTTP database's REST API.
//!
//! # Overview
//! A [`Connection`] hands out [`Database`] handles, which hand out
//! [`Document`] and [`DesignDocument`] handles. Every handle method describes
//! one HTTP request, sends it through the connection's [`Dispatcher`], and
//! reports the reshaped result to a continuation supplied by the caller.
//!
//! # Design
//! - Nothing blocks the calling thread. The dispatcher runs each round trip
//!   on tokio's blocking pool (or a fresh thread outside a runtime) and calls
//!   the continuation there, exactly once. Argument errors caught before
//!   any request is built travel the same way.
//! - Transport failures, undecodable bodies, and server error envelopes all
//!   arrive as `Err(CouchError)`; HTTP status codes are never interpreted.
//! - Methods that take optional parameters accept a [`CallArgs`] built from a
//!   tuple, e.g. `db.view(("app", "by_date", query), cb)`, and bind it to a
//!   declared slot table with the [`args`] resolver.
//! - The network sits behind the [`Transport`] trait; [`UreqTransport`] is
//!   the production implementation.

#[macro_use]
pub mod args;
pub mod config;
pub mod connection;
pub mod database;
pub mod design;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod http;
pub mod query;
pub mod response;
pub mod transport;

pub use args::{Arg, CallArgs};
pub use config::{ClientDefaults, ConnectionConfig, Settings};
pub use connection::Connection;
pub use database::{Database, ViewOutcome};
pub use design::{DesignDocument, DesignFunctions, ViewFunction};
pub use dispatch::{Dispatcher, RequestDescription};
pub use document::{Document, DocumentHandle};
pub use error::{ArgumentError, ConfigError, CouchError, DomainError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use response::{Revision, Rows, ViewInfo};
pub use transport::{Transport, UreqTransport};
