//! Database-level handle.
//!
//! Every method resolves its call arguments against a declared slot table,
//! builds a path under the database name, dispatches, and reshapes the raw
//! response before handing it to the caller's continuation. Failures are
//! forwarded untouched, with one exception: [`Database::exists`] reports a
//! `not_found` error as `Ok(false)`.

use serde_json::{json, Map, Value};

use crate::args::{CallArgs, Slot};
use crate::connection::Connection;
use crate::design::DesignDocument;
use crate::dispatch::RequestDescription;
use crate::document::{Document, DocumentHandle};
use crate::error::CouchError;
use crate::http::HttpMethod;
use crate::query::{self, DESIGN_PREFIX};
use crate::response::{self, reshape, Rows, ViewInfo};

const ALL_DOCS: &[Slot] = &[Slot::optional_mapping("query")];
const COMPACT: &[Slot] = &[Slot::optional_ident("design")];
const PURGE: &[Slot] = &[Slot::mapping("revisions")];
const VIEW: &[Slot] = &[
    Slot::ident("design"),
    Slot::ident("view"),
    Slot::optional_mapping("query"),
];
const SHOW: &[Slot] = &[
    Slot::ident("design"),
    Slot::ident("show"),
    Slot::optional_ident("doc"),
    Slot::optional_mapping("query"),
];
const LIST: &[Slot] = &[
    Slot::ident("design"),
    Slot::ident("list"),
    Slot::ident("view"),
    Slot::optional_ident("other_design"),
    Slot::optional_mapping("query"),
];
const TEMP_VIEW: &[Slot] = &[
    Slot::ident("map"),
    Slot::optional_ident("reduce"),
    Slot::optional_mapping("query"),
];

/// Result of a view-shaped request: paging info and rows.
pub type ViewOutcome = Result<(ViewInfo, Rows), CouchError>;

#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    connection: Connection,
}

impl Database {
    pub fn new(name: impl Into<String>, connection: Connection) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Encoded database path, optionally followed by `/suffix`.
    pub(crate) fn path(&self, suffix: &str) -> String {
        let base = query::segment(&self.name);
        if suffix.is_empty() {
            base
        } else {
            format!("{base}/{suffix}")
        }
    }

    pub(crate) fn send<T, F, S>(&self, description: RequestDescription, callback: F, shape: S)
    where
        T: 'static,
        F: FnOnce(Result<T, CouchError>) + Send + 'static,
        S: FnOnce(Value) -> Result<T, CouchError> + Send + 'static,
    {
        self.connection
            .dispatcher()
            .send(description, reshape(callback, shape));
    }

    /// Handle for document `id`; ids under `_design/` yield the design variant.
    pub fn document(&self, id: impl Into<String>) -> DocumentHandle {
        let id = id.into();
        match id.strip_prefix(DESIGN_PREFIX) {
            Some(name) => DocumentHandle::Design(DesignDocument::new(self.clone(), name)),
            None => DocumentHandle::Plain(Document::with_id(self.clone(), id)),
        }
    }

    /// Handle for a document the server will name on first save.
    pub fn new_document(&self) -> Document {
        Document::new(self.clone())
    }

    pub fn design(&self, name: impl Into<String>) -> DesignDocument {
        DesignDocument::new(self.clone(), name)
    }

    pub fn create<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let description = RequestDescription::new(HttpMethod::Put, self.path(""));
        self.send(description, callback, response::acknowledged);
    }

    pub fn destroy<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let description = RequestDescription::new(HttpMethod::Delete, self.path(""));
        self.send(description, callback, response::acknowledged);
    }

    pub fn info<F>(&self, callback: F)
    where
        F: FnOnce(Result<Map<String, Value>, CouchError>) + Send + 'static,
    {
        self.send(RequestDescription::get(self.path("")), callback, response::object);
    }

    /// `Ok(true)` when the database exists, `Ok(false)` on `not_found`.
    pub fn exists<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        self.connection
            .dispatcher()
            .send(RequestDescription::get(self.path("")), move |outcome| {
                callback(match outcome {
                    Ok(_) => Ok(true),
                    Err(err) if err.is_not_found() => Ok(false),
                    Err(err) => Err(err),
                })
            });
    }

    /// `_all_docs` with an optional query mapping. A `keys` entry is sent
    /// as a POST body.
    pub fn all_docs<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(ViewOutcome) + Send + 'static,
    {
        let mut bound = bind!(ALL_DOCS, args, callback);
        let description = view_request(self.path("_all_docs"), bound.take_mapping("query"));
        self.send(description, callback, response::view_rows);
    }

    /// Compact the database, or one design document's views when a design
    /// name is given.
    pub fn compact<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let bound = bind!(COMPACT, args, callback);
        let path = match bound.text("design") {
            Some(design) => self.path(&format!("_compact/{}", query::segment(design))),
            None => self.path("_compact"),
        };
        self.send(RequestDescription::new(HttpMethod::Post, path), callback, response::acknowledged);
    }

    pub fn view_cleanup<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let description = RequestDescription::new(HttpMethod::Post, self.path("_view_cleanup"));
        self.send(description, callback, response::acknowledged);
    }

    pub fn ensure_full_commit<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let description = RequestDescription::new(HttpMethod::Post, self.path("_ensure_full_commit"));
        self.send(description, callback, response::acknowledged);
    }

    pub fn revs_limit<F>(&self, callback: F)
    where
        F: FnOnce(Result<u64, CouchError>) + Send + 'static,
    {
        self.send(RequestDescription::get(self.path("_revs_limit")), callback, |value| {
            value
                .as_u64()
                .ok_or_else(|| CouchError::Shape(format!("revision limit is not a number: {value}")))
        });
    }

    pub fn set_revs_limit<F>(&self, limit: u64, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let description = RequestDescription::new(HttpMethod::Put, self.path("_revs_limit")).body(json!(limit));
        self.send(description, callback, response::acknowledged);
    }

    /// Purge revisions, given as `{doc_id: [rev, …]}`.
    pub fn purge<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Map<String, Value>, CouchError>) + Send + 'static,
    {
        let mut bound = bind!(PURGE, args, callback);
        let revisions = bound.take_mapping("revisions").unwrap_or_default();
        let description =
            RequestDescription::new(HttpMethod::Post, self.path("_purge")).body(Value::Object(revisions));
        self.send(description, callback, response::object);
    }

    /// Query `_design/<design>/_view/<view>`; accepts `(design, view)` and
    /// `(design, view, query)`.
    pub fn view<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(ViewOutcome) + Send + 'static,
    {
        let mut bound = bind!(VIEW, args, callback);
        let path = self.path(&format!(
            "{DESIGN_PREFIX}{}/_view/{}",
            query::segment(bound.text("design").unwrap_or_default()),
            query::segment(bound.text("view").unwrap_or_default()),
        ));
        let description = view_request(path, bound.take_mapping("query"));
        self.send(description, callback, response::view_rows);
    }

    /// Render a show function, optionally against document `doc`.
    pub fn show<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Value, CouchError>) + Send + 'static,
    {
        let bound = bind!(SHOW, args, callback);
        let mut path = format!(
            "{DESIGN_PREFIX}{}/_show/{}",
            query::segment(bound.text("design").unwrap_or_default()),
            query::segment(bound.text("show").unwrap_or_default()),
        );
        if let Some(doc) = bound.text("doc") {
            path.push('/');
            path.push_str(&query::document_id(doc));
        }
        path.push_str(&query::json_query(bound.mapping("query")));
        self.send(RequestDescription::get(self.path(&path)), callback, Ok);
    }

    /// Render a list function over a view, which may live in another design
    /// document.
    pub fn list<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Value, CouchError>) + Send + 'static,
    {
        let bound = bind!(LIST, args, callback);
        let mut path = format!(
            "{DESIGN_PREFIX}{}/_list/{}/",
            query::segment(bound.text("design").unwrap_or_default()),
            query::segment(bound.text("list").unwrap_or_default()),
        );
        if let Some(other) = bound.text("other_design") {
            path.push_str(&query::segment(other));
            path.push('/');
        }
        path.push_str(&query::segment(bound.text("view").unwrap_or_default()));
        path.push_str(&query::json_query(bound.mapping("query")));
        self.send(RequestDescription::get(self.path(&path)), callback, Ok);
    }

    /// Run an ad hoc map (and optional reduce) function.
    pub fn temp_view<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(ViewOutcome) + Send + 'static,
    {
        let bound = bind!(TEMP_VIEW, args, callback);
        let mut functions = Map::new();
        functions.insert("map".to_string(), json!(bound.text("map").unwrap_or_default()));
        if let Some(reduce) = bound.text("reduce") {
            functions.insert("reduce".to_string(), json!(reduce));
        }
        let path = format!("_temp_view{}", query::json_query(bound.mapping("query")));
        let description = RequestDescription::new(HttpMethod::Post, self.path(&path)).body(Value::Object(functions));
        self.send(description, callback, response::view_rows);
    }
}

/// GET `path?query`, or POST with a `{keys}` body when the query names keys.
fn view_request(path: String, params: Option<Map<String, Value>>) -> RequestDescription {
    let mut params = params.unwrap_or_default();
    let keys = params.remove("keys");
    let target = format!("{path}{}", query::json_query(Some(&params)));
    match keys {
        Some(keys) => RequestDescription::new(HttpMethod::Post, target).body(json!({ "keys": keys })),
        None => RequestDescription::get(target),
    }
}
