//! Server-level handle.
//!
//! A `Connection` is a cheap, cloneable reference to one server endpoint. It
//! owns the dispatcher every database and document handle sends through and
//! tracks nothing else: databases are created on demand and never cached.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{ClientDefaults, ConnectionConfig, Settings};
use crate::database::Database;
use crate::dispatch::{Dispatcher, RequestDescription};
use crate::error::CouchError;
use crate::query;
use crate::response::{self, reshape};
use crate::transport::{Transport, UreqTransport};

#[derive(Debug, Clone)]
pub struct Connection {
    dispatcher: Dispatcher,
}

impl Connection {
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            dispatcher: Dispatcher::new(settings, transport),
        }
    }

    /// Connect over HTTP with `config`, falling back to `defaults`.
    pub fn open(config: ConnectionConfig, defaults: &ClientDefaults) -> Self {
        Self::new(config.resolve(defaults), Arc::new(UreqTransport::new()))
    }

    pub fn settings(&self) -> &Settings {
        self.dispatcher.settings()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(name, self.clone())
    }

    /// Server welcome object (`GET /`).
    pub fn info<F>(&self, callback: F)
    where
        F: FnOnce(Result<Map<String, Value>, CouchError>) + Send + 'static,
    {
        self.dispatcher
            .send(RequestDescription::get(""), reshape(callback, response::object));
    }

    /// Names of all databases. With `no_couch_related` set, names starting
    /// with `_` (`_replicator`, `_users`, …) are left out.
    pub fn list_databases<F>(&self, callback: F)
    where
        F: FnOnce(Result<Vec<String>, CouchError>) + Send + 'static,
    {
        let hide_system = self.settings().no_couch_related;
        self.dispatcher.send(
            RequestDescription::get("_all_dbs"),
            reshape(callback, move |value| {
                let mut names = response::string_list(value)?;
                if hide_system {
                    names.retain(|name| !name.starts_with('_'));
                }
                Ok(names)
            }),
        );
    }

    /// `count` server-generated UUIDs.
    pub fn uuids<F>(&self, count: u32, callback: F)
    where
        F: FnOnce(Result<Vec<String>, CouchError>) + Send + 'static,
    {
        let path = format!("_uuids{}", query::plain_query([("count", count.to_string().as_str())]));
        self.dispatcher.send(
            RequestDescription::get(path),
            reshape(callback, |value| {
                let mut map = response::object(value)?;
                response::string_list(map.remove("uuids").unwrap_or(Value::Null))
            }),
        );
    }
}
