//! In-memory stand-in for the document database's HTTP API.
//!
//! # Design
//! Covers the subset the client speaks: server welcome, database lifecycle,
//! documents and design documents with revision checks, `COPY`, `_all_docs`,
//! view queries, and the maintenance endpoints. Map functions are never
//! evaluated: every view emits each non-design document under its own id, and
//! a view with a reduce function reduces to a row count. Show and list
//! functions are not served.
//!
//! Errors use the server's `{"error", "reason"}` envelope so clients see the
//! same shapes a real server produces.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

const DESIGN_PREFIX: &str = "_design/";
const DEFAULT_REVS_LIMIT: u64 = 1000;
const SYSTEM_DATABASES: [&str; 2] = ["_replicator", "_users"];

type Reply = (StatusCode, Json<Value>);
type Params = Query<HashMap<String, String>>;

fn failure(status: StatusCode, error: &str, reason: &str) -> Reply {
    (status, Json(json!({ "error": error, "reason": reason })))
}

fn missing_database() -> Reply {
    failure(StatusCode::NOT_FOUND, "not_found", "Database does not exist.")
}

fn conflict() -> Reply {
    failure(StatusCode::CONFLICT, "conflict", "Document update conflict.")
}

#[derive(Debug, Clone, Default)]
struct StoredDoc {
    rev: String,
    body: Map<String, Value>,
    deleted: bool,
    history: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug)]
struct Database {
    docs: BTreeMap<String, StoredDoc>,
    revs_limit: u64,
    update_seq: u64,
    purge_seq: u64,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            docs: BTreeMap::new(),
            revs_limit: DEFAULT_REVS_LIMIT,
            update_seq: 0,
            purge_seq: 0,
        }
    }
}

fn generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

fn next_rev(generation: u64) -> String {
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

impl Database {
    fn live(&self) -> impl Iterator<Item = (&String, &StoredDoc)> {
        self.docs.iter().filter(|(_, doc)| !doc.deleted)
    }

    fn info(&self, name: &str) -> Value {
        let deleted = self.docs.values().filter(|doc| doc.deleted).count();
        json!({
            "db_name": name,
            "doc_count": self.docs.len() - deleted,
            "doc_del_count": deleted,
            "update_seq": self.update_seq,
            "purge_seq": self.purge_seq,
            "instance_start_time": "0",
        })
    }

    /// Store `body` as the next revision of `id`. The presented revision
    /// comes from `_rev` in the body or from `rev_hint`.
    fn write(&mut self, id: &str, mut body: Map<String, Value>, rev_hint: Option<String>) -> Result<String, Reply> {
        let presented = match body.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            _ => rev_hint,
        };
        body.remove("_id");
        let deleted = body
            .remove("_deleted")
            .and_then(|flag| flag.as_bool())
            .unwrap_or(false);

        let current = match self.docs.get(id) {
            Some(doc) if !doc.deleted => {
                if presented.as_deref() != Some(doc.rev.as_str()) {
                    return Err(conflict());
                }
                generation(&doc.rev)
            }
            Some(doc) => generation(&doc.rev),
            None if presented.is_some() => return Err(conflict()),
            None => 0,
        };

        let rev = next_rev(current);
        let doc = self.docs.entry(id.to_string()).or_default();
        doc.history.insert(rev.clone(), body.clone());
        doc.rev = rev.clone();
        doc.body = body;
        doc.deleted = deleted;
        self.update_seq += 1;
        Ok(rev)
    }

    fn remove(&mut self, id: &str, presented: Option<&str>) -> Result<String, Reply> {
        let doc = match self.docs.get_mut(id) {
            Some(doc) if !doc.deleted => doc,
            Some(_) => return Err(failure(StatusCode::NOT_FOUND, "not_found", "deleted")),
            None => return Err(failure(StatusCode::NOT_FOUND, "not_found", "missing")),
        };
        if presented != Some(doc.rev.as_str()) {
            return Err(conflict());
        }
        let rev = next_rev(generation(&doc.rev));
        doc.history.insert(rev.clone(), Map::new());
        doc.rev = rev.clone();
        doc.body = Map::new();
        doc.deleted = true;
        self.update_seq += 1;
        Ok(rev)
    }

    fn read(&self, id: &str, rev: Option<&str>) -> Result<Map<String, Value>, Reply> {
        let Some(doc) = self.docs.get(id) else {
            return Err(failure(StatusCode::NOT_FOUND, "not_found", "missing"));
        };
        let (rev, mut body) = match rev {
            Some(rev) => match doc.history.get(rev) {
                Some(body) => (rev.to_string(), body.clone()),
                None => return Err(failure(StatusCode::NOT_FOUND, "not_found", "missing")),
            },
            None if doc.deleted => return Err(failure(StatusCode::NOT_FOUND, "not_found", "deleted")),
            None => (doc.rev.clone(), doc.body.clone()),
        };
        body.insert("_id".to_string(), Value::String(id.to_string()));
        body.insert("_rev".to_string(), Value::String(rev));
        Ok(body)
    }

    /// Drop the given revisions; a document whose current revision is
    /// purged disappears entirely.
    fn purge(&mut self, request: Map<String, Value>) -> Value {
        let mut purged = Map::new();
        for (id, revs) in request {
            let Some(doc) = self.docs.get_mut(&id) else {
                continue;
            };
            let mut removed = Vec::new();
            for rev in revs.as_array().into_iter().flatten().filter_map(Value::as_str) {
                if doc.history.remove(rev).is_some() {
                    removed.push(Value::String(rev.to_string()));
                }
            }
            if !doc.history.contains_key(&doc.rev) {
                self.docs.remove(&id);
            }
            if !removed.is_empty() {
                purged.insert(id, Value::Array(removed));
            }
        }
        self.purge_seq += 1;
        json!({ "purge_seq": self.purge_seq, "purged": purged })
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    user: String,
    password: String,
}

#[derive(Clone)]
struct AppState {
    databases: Arc<RwLock<BTreeMap<String, Database>>>,
    credentials: Option<Arc<Credentials>>,
}

impl AppState {
    fn new(credentials: Option<Credentials>) -> Self {
        let databases = SYSTEM_DATABASES
            .iter()
            .map(|name| (name.to_string(), Database::default()))
            .collect();
        Self {
            databases: Arc::new(RwLock::new(databases)),
            credentials: credentials.map(Arc::new),
        }
    }
}

/// Open server: every request is accepted.
pub fn app() -> Router {
    router(AppState::new(None))
}

/// Server that answers `401 unauthorized` unless a request carries Basic
/// credentials for `user`/`password`.
pub fn app_with_credentials(user: impl Into<String>, password: impl Into<String>) -> Router {
    router(AppState::new(Some(Credentials {
        user: user.into(),
        password: password.into(),
    })))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/_all_dbs", get(all_dbs))
        .route("/_uuids", get(uuids))
        .route("/{db}", any(database))
        .route("/{db}/_all_docs", get(all_docs).post(all_docs))
        .route("/{db}/_compact", post(compact))
        .route("/{db}/_compact/{design}", post(compact_design))
        .route("/{db}/_view_cleanup", post(view_cleanup))
        .route("/{db}/_ensure_full_commit", post(ensure_full_commit))
        .route("/{db}/_revs_limit", get(revs_limit).put(set_revs_limit))
        .route("/{db}/_purge", post(purge))
        .route("/{db}/_temp_view", post(temp_view))
        .route("/{db}/_design/{design}", any(design_document))
        .route("/{db}/_design/{design}/_view/{view}", get(view).post(view))
        .route("/{db}/{doc}", any(document))
        .fallback(unknown)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, router).await
}

fn authorized(credentials: &Credentials, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|pair| pair == format!("{}:{}", credentials.user, credentials.password))
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(credentials) = &state.credentials {
        if !authorized(credentials, request.headers()) {
            tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
            return failure(StatusCode::UNAUTHORIZED, "unauthorized", "Name or password is incorrect.")
                .into_response();
        }
    }
    next.run(request).await
}

async fn unknown() -> Reply {
    failure(StatusCode::NOT_FOUND, "not_found", "missing")
}

async fn welcome() -> Json<Value> {
    Json(json!({
        "couchdb": "Welcome",
        "version": "3.3.3",
        "vendor": { "name": "mock-server" },
    }))
}

async fn all_dbs(State(state): State<AppState>) -> Json<Value> {
    let databases = state.databases.read().await;
    Json(json!(databases.keys().collect::<Vec<_>>()))
}

async fn uuids(Query(params): Params) -> Reply {
    let count = params
        .get("count")
        .and_then(|count| count.parse::<usize>().ok())
        .unwrap_or(1);
    let uuids: Vec<String> = (0..count).map(|_| Uuid::new_v4().simple().to_string()).collect();
    (StatusCode::OK, Json(json!({ "uuids": uuids })))
}

fn valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|first| first.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c))
}

async fn database(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    body: Bytes,
) -> Reply {
    let mut databases = state.databases.write().await;
    match method {
        Method::PUT => {
            if !valid_database_name(&name) {
                return failure(StatusCode::BAD_REQUEST, "illegal_database_name", "Name is invalid.");
            }
            if databases.contains_key(&name) {
                return failure(StatusCode::PRECONDITION_FAILED, "file_exists", "The database could not be created, the file already exists.");
            }
            databases.insert(name.clone(), Database::default());
            tracing::debug!(db = %name, "created database");
            (StatusCode::CREATED, Json(json!({ "ok": true })))
        }
        Method::DELETE => match databases.remove(&name) {
            Some(_) => {
                tracing::debug!(db = %name, "deleted database");
                (StatusCode::OK, Json(json!({ "ok": true })))
            }
            None => missing_database(),
        },
        Method::GET | Method::HEAD => match databases.get(&name) {
            Some(db) => (StatusCode::OK, Json(db.info(&name))),
            None => missing_database(),
        },
        Method::POST => {
            let Some(db) = databases.get_mut(&name) else {
                return missing_database();
            };
            let body = match json_object(&body) {
                Ok(body) => body,
                Err(reply) => return reply,
            };
            let id = match body.get("_id") {
                Some(Value::String(id)) => id.clone(),
                _ => Uuid::new_v4().simple().to_string(),
            };
            stored(&name, &id, db.write(&id, body, None))
        }
        _ => failure(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "Only DELETE,GET,HEAD,POST,PUT allowed"),
    }
}

fn json_object(body: &Bytes) -> Result<Map<String, Value>, Reply> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(failure(StatusCode::BAD_REQUEST, "bad_request", "Request body must be a JSON object")),
    }
}

fn stored(db: &str, id: &str, outcome: Result<String, Reply>) -> Reply {
    match outcome {
        Ok(rev) => {
            tracing::debug!(%db, %id, %rev, "stored document");
            (StatusCode::CREATED, Json(json!({ "ok": true, "id": id, "rev": rev })))
        }
        Err(reply) => reply,
    }
}

async fn design_document(
    State(state): State<AppState>,
    Path((db, design)): Path<(String, String)>,
    method: Method,
    Query(params): Params,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let id = format!("{DESIGN_PREFIX}{design}");
    document_request(state, db, id, method, params, headers, body).await
}

async fn document(
    State(state): State<AppState>,
    Path((db, id)): Path<(String, String)>,
    method: Method,
    Query(params): Params,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    document_request(state, db, id, method, params, headers, body).await
}

async fn document_request(
    state: AppState,
    name: String,
    id: String,
    method: Method,
    params: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let mut databases = state.databases.write().await;
    let Some(db) = databases.get_mut(&name) else {
        return missing_database();
    };
    let rev = params.get("rev").cloned();

    match method.as_str() {
        "GET" | "HEAD" => match db.read(&id, rev.as_deref()) {
            Ok(body) => (StatusCode::OK, Json(Value::Object(body))),
            Err(reply) => reply,
        },
        "PUT" => match json_object(&body) {
            Ok(body) => stored(&name, &id, db.write(&id, body, rev)),
            Err(reply) => reply,
        },
        "DELETE" => match db.remove(&id, rev.as_deref()) {
            Ok(rev) => {
                tracing::debug!(db = %name, %id, %rev, "deleted document");
                (StatusCode::OK, Json(json!({ "ok": true, "id": id, "rev": rev })))
            }
            Err(reply) => reply,
        },
        "COPY" => {
            let Some(destination) = headers.get("destination").and_then(|value| value.to_str().ok()) else {
                return failure(StatusCode::BAD_REQUEST, "bad_request", "Destination header is mandatory for COPY.");
            };
            let (target, target_rev) = match destination.split_once('?') {
                Some((target, query)) => (
                    target.to_string(),
                    query.strip_prefix("rev=").map(str::to_string),
                ),
                None => (destination.to_string(), None),
            };
            match db.read(&id, rev.as_deref()) {
                Ok(source) => stored(&name, &target, db.write(&target, source_body(source), target_rev)),
                Err(reply) => reply,
            }
        }
        _ => failure(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Only DELETE,GET,HEAD,PUT,COPY allowed",
        ),
    }
}

/// A read body minus its identity, ready to be written elsewhere.
fn source_body(mut body: Map<String, Value>) -> Map<String, Value> {
    body.remove("_id");
    body.remove("_rev");
    body
}

async fn compact(State(state): State<AppState>, Path(db): Path<String>) -> Reply {
    match state.databases.read().await.get(&db) {
        Some(_) => (StatusCode::ACCEPTED, Json(json!({ "ok": true }))),
        None => missing_database(),
    }
}

async fn compact_design(State(state): State<AppState>, Path((db, design)): Path<(String, String)>) -> Reply {
    let databases = state.databases.read().await;
    let Some(db) = databases.get(&db) else {
        return missing_database();
    };
    let id = format!("{DESIGN_PREFIX}{design}");
    let found = db.live().any(|(doc_id, _)| *doc_id == id);
    if found {
        (StatusCode::ACCEPTED, Json(json!({ "ok": true })))
    } else {
        failure(StatusCode::NOT_FOUND, "not_found", "missing")
    }
}

async fn view_cleanup(State(state): State<AppState>, Path(db): Path<String>) -> Reply {
    match state.databases.read().await.get(&db) {
        Some(_) => (StatusCode::ACCEPTED, Json(json!({ "ok": true }))),
        None => missing_database(),
    }
}

async fn ensure_full_commit(State(state): State<AppState>, Path(db): Path<String>) -> Reply {
    match state.databases.read().await.get(&db) {
        Some(_) => (
            StatusCode::CREATED,
            Json(json!({ "ok": true, "instance_start_time": "0" })),
        ),
        None => missing_database(),
    }
}

async fn revs_limit(State(state): State<AppState>, Path(db): Path<String>) -> Reply {
    match state.databases.read().await.get(&db) {
        Some(db) => (StatusCode::OK, Json(json!(db.revs_limit))),
        None => missing_database(),
    }
}

async fn set_revs_limit(State(state): State<AppState>, Path(db): Path<String>, body: Bytes) -> Reply {
    let mut databases = state.databases.write().await;
    let Some(db) = databases.get_mut(&db) else {
        return missing_database();
    };
    match serde_json::from_slice::<Value>(&body).ok().and_then(|limit| limit.as_u64()) {
        Some(limit) if limit > 0 => {
            db.revs_limit = limit;
            (StatusCode::OK, Json(json!({ "ok": true })))
        }
        _ => failure(StatusCode::BAD_REQUEST, "bad_request", "`revs_limit` must be a positive integer"),
    }
}

async fn purge(State(state): State<AppState>, Path(db): Path<String>, body: Bytes) -> Reply {
    let mut databases = state.databases.write().await;
    let Some(db) = databases.get_mut(&db) else {
        return missing_database();
    };
    match json_object(&body) {
        Ok(request) => (StatusCode::CREATED, Json(db.purge(request))),
        Err(reply) => reply,
    }
}

/// Row selection parameters shared by `_all_docs` and views. Query values
/// arrive JSON-encoded; anything that fails to parse is taken as a string.
#[derive(Debug)]
struct RowQuery {
    key: Option<Value>,
    keys: Option<Vec<Value>>,
    limit: Option<usize>,
    skip: usize,
    descending: bool,
    include_docs: bool,
    reduce: bool,
}

fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl RowQuery {
    fn parse(params: &HashMap<String, String>, body: &Bytes) -> Self {
        let param = |name: &str| params.get(name).map(|raw| decode(raw));
        let flag = |name: &str, default: bool| param(name).and_then(|v| v.as_bool()).unwrap_or(default);
        let count = |name: &str| param(name).and_then(|v| v.as_u64()).map(|n| n as usize);

        let body_keys = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|body| body.get("keys").cloned());
        let keys = body_keys
            .or_else(|| param("keys"))
            .and_then(|keys| keys.as_array().cloned());

        Self {
            key: param("key"),
            keys,
            limit: count("limit"),
            skip: count("skip").unwrap_or(0),
            descending: flag("descending", false),
            include_docs: flag("include_docs", false),
            reduce: flag("reduce", true),
        }
    }

    /// Filter, order, and page `rows`, each `(id, key, value, doc)`.
    fn select(&self, rows: Vec<(String, Value, Value, Value)>) -> Vec<Value> {
        let mut picked: Vec<_> = match (&self.keys, &self.key) {
            (Some(keys), _) => keys
                .iter()
                .flat_map(|key| rows.iter().filter(move |row| &row.1 == key))
                .cloned()
                .collect(),
            (None, Some(key)) => rows.into_iter().filter(|row| &row.1 == key).collect(),
            (None, None) => rows,
        };
        if self.descending {
            picked.reverse();
        }
        picked
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|(id, key, value, doc)| {
                let mut row = json!({ "id": id, "key": key, "value": value });
                if self.include_docs {
                    row["doc"] = doc;
                }
                row
            })
            .collect()
    }
}

fn with_identity(id: &str, doc: &StoredDoc) -> Value {
    let mut body = doc.body.clone();
    body.insert("_id".to_string(), json!(id));
    body.insert("_rev".to_string(), json!(doc.rev));
    Value::Object(body)
}

async fn all_docs(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Params,
    body: Bytes,
) -> Reply {
    let databases = state.databases.read().await;
    let Some(db) = databases.get(&db) else {
        return missing_database();
    };
    let query = RowQuery::parse(&params, &body);
    let rows: Vec<_> = db
        .live()
        .map(|(id, doc)| (id.clone(), json!(id), json!({ "rev": doc.rev }), with_identity(id, doc)))
        .collect();
    let total = rows.len();
    let rows = query.select(rows);
    (
        StatusCode::OK,
        Json(json!({ "total_rows": total, "offset": query.skip, "rows": rows })),
    )
}

/// Rows every view emits: one per live non-design document, keyed by id.
fn emitted(db: &Database) -> Vec<(String, Value, Value, Value)> {
    db.live()
        .filter(|(id, _)| !id.starts_with(DESIGN_PREFIX))
        .map(|(id, doc)| (id.clone(), json!(id), Value::Null, with_identity(id, doc)))
        .collect()
}

fn view_result(db: &Database, query: &RowQuery, reduces: bool) -> Value {
    let rows = emitted(db);
    let total = rows.len();
    let selected = query.select(rows);
    if reduces && query.reduce {
        return json!({ "rows": [{ "key": null, "value": selected.len() }] });
    }
    json!({ "total_rows": total, "offset": query.skip, "rows": selected })
}

async fn view(
    State(state): State<AppState>,
    Path((db, design, view)): Path<(String, String, String)>,
    Query(params): Params,
    body: Bytes,
) -> Reply {
    let databases = state.databases.read().await;
    let Some(db) = databases.get(&db) else {
        return missing_database();
    };
    let id = format!("{DESIGN_PREFIX}{design}");
    let Some(doc) = db.docs.get(&id).filter(|doc| !doc.deleted) else {
        return failure(StatusCode::NOT_FOUND, "not_found", "missing");
    };
    let Some(function) = doc.body.get("views").and_then(|views| views.get(&view)) else {
        return failure(StatusCode::NOT_FOUND, "not_found", "missing_named_view");
    };
    let reduces = function.get("reduce").is_some_and(|reduce| !reduce.is_null());
    let query = RowQuery::parse(&params, &body);
    (StatusCode::OK, Json(view_result(db, &query, reduces)))
}

async fn temp_view(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(params): Params,
    body: Bytes,
) -> Reply {
    let databases = state.databases.read().await;
    let Some(db) = databases.get(&db) else {
        return missing_database();
    };
    let functions = match json_object(&body) {
        Ok(functions) => functions,
        Err(reply) => return reply,
    };
    if !functions.contains_key("map") {
        return failure(StatusCode::BAD_REQUEST, "bad_request", "`map` function missing");
    }
    let reduces = functions.get("reduce").is_some_and(|reduce| !reduce.is_null());
    let query = RowQuery::parse(&params, &Bytes::new());
    (StatusCode::OK, Json(view_result(db, &query, reduces)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn revisions_count_generations() {
        assert_eq!(generation("3-abc"), 3);
        assert_eq!(generation("garbage"), 0);
        assert!(next_rev(3).starts_with("4-"));
    }

    #[test]
    fn database_names_follow_server_rules() {
        assert!(valid_database_name("notes"));
        assert!(valid_database_name("team/notes_2"));
        assert!(!valid_database_name("_private"));
        assert!(!valid_database_name("Upper"));
        assert!(!valid_database_name(""));
    }

    #[test]
    fn write_requires_current_revision() {
        let mut db = Database::default();
        let first = db.write("doc", body(json!({"n": 1})), None).unwrap();
        assert!(first.starts_with("1-"));

        let (status, _) = db.write("doc", body(json!({"n": 2})), None).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);

        let second = db.write("doc", body(json!({"_rev": first, "n": 2})), None).unwrap();
        assert!(second.starts_with("2-"));
        assert_eq!(db.read("doc", None).unwrap()["n"], 2);
    }

    #[test]
    fn new_document_with_revision_conflicts() {
        let mut db = Database::default();
        let (status, _) = db.write("doc", Map::new(), Some("1-x".to_string())).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn removed_documents_read_as_deleted_and_can_be_recreated() {
        let mut db = Database::default();
        let rev = db.write("doc", Map::new(), None).unwrap();
        let tombstone = db.remove("doc", Some(&rev)).unwrap();
        assert!(tombstone.starts_with("2-"));

        let (status, Json(reply)) = db.read("doc", None).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(reply["reason"], "deleted");

        let again = db.write("doc", Map::new(), None).unwrap();
        assert!(again.starts_with("3-"));
    }

    #[test]
    fn old_revisions_stay_readable_until_purged() {
        let mut db = Database::default();
        let first = db.write("doc", body(json!({"v": 1})), None).unwrap();
        let second = db.write("doc", body(json!({"_rev": first, "v": 2})), None).unwrap();
        assert_eq!(db.read("doc", Some(&first)).unwrap()["v"], 1);

        let reply = db.purge(body(json!({"doc": [first.clone()]})));
        assert_eq!(reply["purged"]["doc"][0], first.as_str());
        assert!(db.read("doc", Some(&first)).is_err());
        assert_eq!(db.read("doc", None).unwrap()["_rev"], second.as_str());

        db.purge(body(json!({"doc": [second]})));
        assert!(db.docs.is_empty());
    }

    #[test]
    fn row_query_filters_and_pages() {
        let rows = ["a", "b", "c"]
            .iter()
            .map(|id| (id.to_string(), json!(id), Value::Null, Value::Null))
            .collect::<Vec<_>>();

        let params = HashMap::from([("key".to_string(), "\"b\"".to_string())]);
        let picked = RowQuery::parse(&params, &Bytes::new()).select(rows.clone());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0]["id"], "b");

        let params = HashMap::from([
            ("descending".to_string(), "true".to_string()),
            ("skip".to_string(), "1".to_string()),
            ("limit".to_string(), "1".to_string()),
        ]);
        let picked = RowQuery::parse(&params, &Bytes::new()).select(rows.clone());
        assert_eq!(picked[0]["id"], "b");

        let keys = Bytes::from_static(br#"{"keys": ["c", "a"]}"#);
        let picked = RowQuery::parse(&HashMap::new(), &keys).select(rows);
        let ids: Vec<_> = picked.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!("c"), json!("a")]);
    }
}
