//! Document handles.
//!
//! # Design
//! A `Document` is a cloneable handle over shared state: id, last
//! acknowledged revision, and a local body. Body edits stay local until
//! `save`. Every successful write replaces the revision with the one the
//! server returned, so the handle always carries the revision the next write
//! must present. Conflicts (stale revisions, writes after deletion) are left
//! for the server to detect and arrive as domain errors.
//!
//! Design documents share the same state with an extra variant holding their
//! show and view tables; see [`DesignDocument`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::args::{CallArgs, Slot};
use crate::database::Database;
use crate::design::{DesignDocument, DesignFunctions};
use crate::dispatch::{self, RequestDescription};
use crate::error::{ArgumentError, CouchError};
use crate::http::HttpMethod;
use crate::query;
use crate::response::{self, Revision};

const LOAD: &[Slot] = &[Slot::optional_ident("rev")];

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum DocumentKind {
    #[default]
    Plain,
    Design(DesignFunctions),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DocumentState {
    pub(crate) id: Option<String>,
    pub(crate) rev: Option<String>,
    pub(crate) fields: Map<String, Value>,
    pub(crate) deleted: bool,
    pub(crate) kind: DocumentKind,
}

impl DocumentState {
    /// The JSON body a save would send.
    pub(crate) fn body(&self) -> Result<Map<String, Value>, CouchError> {
        let mut body = self.fields.clone();
        if let DocumentKind::Design(functions) = &self.kind {
            functions.write_into(&mut body)?;
        }
        if let Some(id) = &self.id {
            body.insert("_id".to_string(), Value::String(id.clone()));
        }
        if let Some(rev) = &self.rev {
            body.insert("_rev".to_string(), Value::String(rev.clone()));
        }
        Ok(body)
    }

    /// Replace local state with a body fetched from the server. On error the
    /// state is left exactly as it was.
    pub(crate) fn absorb(&mut self, mut body: Map<String, Value>) -> Result<(), CouchError> {
        let kind = match &self.kind {
            DocumentKind::Design(_) => DocumentKind::Design(DesignFunctions::extract(&mut body)?),
            DocumentKind::Plain => DocumentKind::Plain,
        };
        let id = match body.remove("_id") {
            Some(Value::String(id)) => Some(id),
            _ => self.id.clone(),
        };
        let rev = match body.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            _ => self.rev.clone(),
        };
        let deleted = body
            .remove("_deleted")
            .and_then(|flag| flag.as_bool())
            .unwrap_or(false);
        *self = DocumentState {
            id,
            rev,
            fields: body,
            deleted,
            kind,
        };
        Ok(())
    }
}

fn lock(state: &Mutex<DocumentState>) -> MutexGuard<'_, DocumentState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct Document {
    database: Database,
    state: Arc<Mutex<DocumentState>>,
}

impl Document {
    pub(crate) fn new(database: Database) -> Self {
        Self::from_state(database, DocumentState::default())
    }

    pub(crate) fn with_id(database: Database, id: impl Into<String>) -> Self {
        Self::from_state(
            database,
            DocumentState {
                id: Some(id.into()),
                ..DocumentState::default()
            },
        )
    }

    pub(crate) fn design(database: Database, id: String) -> Self {
        Self::from_state(
            database,
            DocumentState {
                id: Some(id),
                kind: DocumentKind::Design(DesignFunctions::default()),
                ..DocumentState::default()
            },
        )
    }

    fn from_state(database: Database, state: DocumentState) -> Self {
        Self {
            database,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, DocumentState> {
        lock(&self.state)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn id(&self) -> Option<String> {
        self.state().id.clone()
    }

    /// Revision of the last write or load the server acknowledged.
    pub fn rev(&self) -> Option<String> {
        self.state().rev.clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    pub fn is_design(&self) -> bool {
        matches!(self.state().kind, DocumentKind::Design(_))
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.state().fields.get(name).cloned()
    }

    /// Set a body field locally; returns the previous value.
    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.state().fields.insert(name.into(), value.into())
    }

    pub fn remove_field(&self, name: &str) -> Option<Value> {
        self.state().fields.remove(name)
    }

    pub fn fields(&self) -> Map<String, Value> {
        self.state().fields.clone()
    }

    /// The body `save` would send, including `_id`/`_rev`.
    pub fn body(&self) -> Result<Map<String, Value>, CouchError> {
        self.state().body()
    }

    fn path(&self, id: &str) -> String {
        self.database.path(&query::document_id(id))
    }

    /// PUT the body under the current id, or POST it so the server assigns
    /// one. Adopts the acknowledged id and revision.
    pub fn save<F>(&self, callback: F)
    where
        F: FnOnce(Result<Revision, CouchError>) + Send + 'static,
    {
        let (id, body) = {
            let state = self.state();
            (state.id.clone(), state.body())
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => return dispatch::reject(callback, err),
        };
        let description = match &id {
            Some(id) => RequestDescription::new(HttpMethod::Put, self.path(id)),
            None => RequestDescription::new(HttpMethod::Post, self.database.path("")),
        }
        .body(Value::Object(body));

        let state = Arc::clone(&self.state);
        self.database.send(description, callback, move |value| {
            let revision = response::revision(value)?;
            let mut state = lock(&state);
            state.id = Some(revision.id.clone());
            state.rev = Some(revision.rev.clone());
            state.deleted = false;
            Ok(revision)
        });
    }

    /// Fetch the document, or a specific revision of it, replacing local
    /// state. Yields the body fields.
    pub fn load<A, F>(&self, args: A, callback: F)
    where
        A: Into<CallArgs>,
        F: FnOnce(Result<Map<String, Value>, CouchError>) + Send + 'static,
    {
        let bound = bind!(LOAD, args, callback);
        let Some(id) = self.id() else {
            return dispatch::reject(callback, ArgumentError::Missing { slot: "id" }.into());
        };
        let path = match bound.text("rev") {
            Some(rev) => format!("{}{}", self.path(&id), query::plain_query([("rev", rev)])),
            None => self.path(&id),
        };

        let state = Arc::clone(&self.state);
        self.database.send(RequestDescription::get(path), callback, move |value| {
            let body = response::object(value)?;
            let mut state = lock(&state);
            state.absorb(body)?;
            Ok(state.fields.clone())
        });
    }

    /// DELETE the current revision. The handle keeps the tombstone revision
    /// and is marked deleted.
    pub fn destroy<F>(&self, callback: F)
    where
        F: FnOnce(Result<bool, CouchError>) + Send + 'static,
    {
        let (id, rev) = {
            let state = self.state();
            (state.id.clone(), state.rev.clone())
        };
        let Some(id) = id else {
            return dispatch::reject(callback, ArgumentError::Missing { slot: "id" }.into());
        };
        let path = match &rev {
            Some(rev) => format!("{}{}", self.path(&id), query::plain_query([("rev", rev.as_str())])),
            None => self.path(&id),
        };

        let state = Arc::clone(&self.state);
        self.database
            .send(RequestDescription::new(HttpMethod::Delete, path), callback, move |value| {
                let tombstone = response::revision(value)?;
                let mut state = lock(&state);
                state.rev = Some(tombstone.rev);
                state.deleted = true;
                Ok(true)
            });
    }

    /// Server-side copy to `destination` (a document id, optionally
    /// suffixed with `?rev=` to overwrite an existing revision).
    pub fn copy<F>(&self, destination: &str, callback: F)
    where
        F: FnOnce(Result<Revision, CouchError>) + Send + 'static,
    {
        let Some(id) = self.id() else {
            return dispatch::reject(callback, ArgumentError::Missing { slot: "id" }.into());
        };
        let description =
            RequestDescription::new(HttpMethod::Copy, self.path(&id)).header("Destination", destination);
        self.database.send(description, callback, response::revision);
    }
}

/// A document handle as returned by [`Database::document`].
#[derive(Debug, Clone)]
pub enum DocumentHandle {
    Plain(Document),
    Design(DesignDocument),
}

impl DocumentHandle {
    pub fn document(&self) -> &Document {
        match self {
            DocumentHandle::Plain(document) => document,
            DocumentHandle::Design(design) => design.document(),
        }
    }

    pub fn is_design(&self) -> bool {
        matches!(self, DocumentHandle::Design(_))
    }

    pub fn into_design(self) -> Option<DesignDocument> {
        match self {
            DocumentHandle::Design(design) => Some(design),
            DocumentHandle::Plain(_) => None,
        }
    }

    pub fn into_document(self) -> Document {
        match self {
            DocumentHandle::Plain(document) => document,
            DocumentHandle::Design(design) => design.document().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn body_carries_id_and_rev() {
        let state = DocumentState {
            id: Some("doc".to_string()),
            rev: Some("1-a".to_string()),
            fields: map(json!({"title": "x"})),
            ..DocumentState::default()
        };
        assert_eq!(
            Value::Object(state.body().unwrap()),
            json!({"_id": "doc", "_rev": "1-a", "title": "x"})
        );
    }

    #[test]
    fn new_document_body_has_no_metadata() {
        let state = DocumentState {
            fields: map(json!({"n": 1})),
            ..DocumentState::default()
        };
        assert_eq!(Value::Object(state.body().unwrap()), json!({"n": 1}));
    }

    #[test]
    fn absorb_splits_metadata_from_fields() {
        let mut state = DocumentState::default();
        state
            .absorb(map(json!({"_id": "doc", "_rev": "3-c", "title": "y"})))
            .unwrap();
        assert_eq!(state.id.as_deref(), Some("doc"));
        assert_eq!(state.rev.as_deref(), Some("3-c"));
        assert!(!state.deleted);
        assert_eq!(Value::Object(state.fields), json!({"title": "y"}));
    }

    #[test]
    fn absorb_replaces_previous_fields() {
        let mut state = DocumentState {
            fields: map(json!({"stale": true})),
            ..DocumentState::default()
        };
        state.absorb(map(json!({"_id": "doc", "_rev": "2-b", "fresh": 1}))).unwrap();
        assert_eq!(Value::Object(state.fields), json!({"fresh": 1}));
    }

    #[test]
    fn design_state_moves_tables_out_of_fields() {
        let mut state = DocumentState {
            kind: DocumentKind::Design(DesignFunctions::default()),
            ..DocumentState::default()
        };
        state
            .absorb(map(json!({
                "_id": "_design/app",
                "_rev": "1-a",
                "language": "javascript",
                "shows": {"detail": "function(doc, req) {}"},
                "views": {"by_id": {"map": "function(doc) { emit(doc._id, null); }"}}
            })))
            .unwrap();
        assert_eq!(Value::Object(state.fields.clone()), json!({"language": "javascript"}));
        let DocumentKind::Design(functions) = &state.kind else {
            panic!("kind changed");
        };
        assert_eq!(functions.shows.len(), 1);
        assert_eq!(functions.views["by_id"].reduce, None);

        let body = state.body().unwrap();
        assert_eq!(body["shows"]["detail"], "function(doc, req) {}");
        assert!(body["views"]["by_id"].get("reduce").is_none());
    }

    #[test]
    fn malformed_design_body_leaves_state_untouched() {
        let mut state = DocumentState {
            id: Some("_design/app".to_string()),
            fields: map(json!({"language": "old"})),
            kind: DocumentKind::Design(DesignFunctions::default()),
            ..DocumentState::default()
        };
        let before = state.clone();
        let err = state
            .absorb(map(json!({
                "_id": "_design/app",
                "_rev": "9-z",
                "language": "js",
                "views": {"v": "not an object"}
            })))
            .unwrap_err();
        assert!(matches!(err, CouchError::Shape(_)));
        assert_eq!(state, before);
        assert_eq!(state.rev, None);
    }

    #[test]
    fn plain_state_keeps_shows_as_ordinary_fields() {
        let mut state = DocumentState::default();
        state.absorb(map(json!({"_id": "d", "shows": 3}))).unwrap();
        assert_eq!(state.fields["shows"], 3);
    }
}
