//! Design documents: documents under the `_design/` prefix that carry show
//! and view function sources.
//!
//! # Design
//! A `DesignDocument` wraps a [`Document`] whose state holds the design
//! variant. Its `shows` and `views` tables start empty, are written into the
//! body on save, and are parsed back out on load, so they never appear among
//! the ordinary fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::CallArgs;
use crate::database::{Database, ViewOutcome};
use crate::document::{Document, DocumentKind};
use crate::error::CouchError;
use crate::query::DESIGN_PREFIX;
use crate::response::Revision;

const SHOWS: &str = "shows";
const VIEWS: &str = "views";

/// Source of a view: a map function and an optional reduce function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFunction {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// The show and view tables of a design document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesignFunctions {
    pub shows: BTreeMap<String, String>,
    pub views: BTreeMap<String, ViewFunction>,
}

impl DesignFunctions {
    pub(crate) fn write_into(&self, body: &mut Map<String, Value>) -> Result<(), CouchError> {
        body.insert(SHOWS.to_string(), serde_json::to_value(&self.shows).map_err(CouchError::Encode)?);
        body.insert(VIEWS.to_string(), serde_json::to_value(&self.views).map_err(CouchError::Encode)?);
        Ok(())
    }

    /// Remove `shows`/`views` from `body` and parse them; absent tables are empty.
    pub(crate) fn extract(body: &mut Map<String, Value>) -> Result<Self, CouchError> {
        Ok(Self {
            shows: take_table(body, SHOWS)?,
            views: take_table(body, VIEWS)?,
        })
    }
}

fn take_table<T: serde::de::DeserializeOwned>(
    body: &mut Map<String, Value>,
    name: &str,
) -> Result<BTreeMap<String, T>, CouchError> {
    match body.remove(name) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(table) => serde_json::from_value(table)
            .map_err(|e| CouchError::Shape(format!("design document `{name}` table is malformed: {e}"))),
    }
}

#[derive(Debug, Clone)]
pub struct DesignDocument {
    name: String,
    document: Document,
}

impl DesignDocument {
    pub(crate) fn new(database: Database, name: impl Into<String>) -> Self {
        let name = name.into();
        let document = Document::design(database, format!("{DESIGN_PREFIX}{name}"));
        Self { name, document }
    }

    /// Name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> String {
        format!("{DESIGN_PREFIX}{}", self.name)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn with_functions<R>(&self, op: impl FnOnce(&mut DesignFunctions) -> R) -> Option<R> {
        match &mut self.document.state().kind {
            DocumentKind::Design(functions) => Some(op(functions)),
            DocumentKind::Plain => None,
        }
    }

    /// Set a show function source; returns the previous source.
    pub fn set_show(&self, name: impl Into<String>, source: impl Into<String>) -> Option<String> {
        self.with_functions(|f| f.shows.insert(name.into(), source.into()))
            .flatten()
    }

    pub fn show_source(&self, name: &str) -> Option<String> {
        self.with_functions(|f| f.shows.get(name).cloned()).flatten()
    }

    pub fn remove_show(&self, name: &str) -> Option<String> {
        self.with_functions(|f| f.shows.remove(name)).flatten()
    }

    pub fn shows(&self) -> BTreeMap<String, String> {
        self.with_functions(|f| f.shows.clone()).unwrap_or_default()
    }

    /// Set a view's map and optional reduce source; returns the previous view.
    pub fn set_view(
        &self,
        name: impl Into<String>,
        map: impl Into<String>,
        reduce: Option<&str>,
    ) -> Option<ViewFunction> {
        let function = ViewFunction {
            map: map.into(),
            reduce: reduce.map(str::to_string),
        };
        self.with_functions(|f| f.views.insert(name.into(), function))
            .flatten()
    }

    pub fn view_function(&self, name: &str) -> Option<ViewFunction> {
        self.with_functions(|f| f.views.get(name).cloned()).flatten()
    }

    pub fn remove_view(&self, name: &str) -> Option<ViewFunction> {
        self.with_functions(|f| f.views.remove(name)).flatten()
    }

    pub fn views(&self) -> BTreeMap<String, ViewFunction> {
        self.with_functions(|f| f.views.clone()).unwrap_or_default()
    }

    pub fn save<F>(&self, callback: F)
    where
        F: FnOnce(Result<Revision, CouchError>) + Send + 'static,
    {
        self.document.save(callback);
    }

    pub fn load<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Map<String, Value>, CouchError>) + Send + 'static,
    {
        self.document.load(args, callback);
    }

    pub fn destroy<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        self.document.destroy(callback);
    }

    /// Query one of this design's views: `(view)` or `(view, query)`.
    pub fn query_view<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(ViewOutcome) + Send + 'static,
    {
        let args = args.into().prepend(self.name.as_str());
        self.document.database().view(args, callback);
    }

    /// Render one of this design's shows: `(show)`, `(show, doc)`, with an
    /// optional query mapping.
    pub fn query_show<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Value, CouchError>) + Send + 'static,
    {
        let args = args.into().prepend(self.name.as_str());
        self.document.database().show(args, callback);
    }

    /// Render one of this design's lists: `(list, view)`,
    /// `(list, view, other_design)`, with an optional query mapping.
    pub fn query_list<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Value, CouchError>) + Send + 'static,
    {
        let args = args.into().prepend(self.name.as_str());
        self.document.database().list(args, callback);
    }

    /// Compact this design's view indexes.
    pub fn compact<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        self.document.database().compact(self.name.as_str(), callback);
    }
}
