//! Full lifecycle test against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives connection, database,
//! document, and design document handles over real HTTP through
//! `UreqTransport`. Validates that request building, dispatch, and response
//! reshaping work end-to-end with an actual server.

use std::sync::mpsc;
use std::time::Duration;

use couch_client::{ClientDefaults, Connection, ConnectionConfig, CouchError, ViewInfo};
use serde_json::{json, Map, Value};

/// Serve `router` on a random local port from a background thread.
fn start(router: axum::Router) -> u16 {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, router).await
        })
        .unwrap();
    });
    port
}

fn connect(port: u16, config: ConnectionConfig) -> Connection {
    Connection::open(config.port(port), &ClientDefaults::default())
}

fn wait<T: Send + 'static>(
    start: impl FnOnce(Box<dyn FnOnce(Result<T, CouchError>) + Send>),
) -> Result<T, CouchError> {
    let (tx, rx) = mpsc::channel();
    start(Box::new(move |outcome| {
        let _ = tx.send(outcome);
    }));
    rx.recv_timeout(Duration::from_secs(10))
        .expect("continuation was not invoked")
}

fn query(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn full_lifecycle() {
    let port = start(mock_server::app());
    let conn = connect(port, ConnectionConfig::new().no_couch_related(true));

    // Step 1: server answers and only system databases exist, hidden here.
    let info = wait(|cb| conn.info(cb)).unwrap();
    assert_eq!(info["couchdb"], "Welcome");
    assert!(wait(|cb| conn.list_databases(cb)).unwrap().is_empty());
    assert_eq!(wait(|cb| conn.uuids(2, cb)).unwrap().len(), 2);

    // Step 2: create the database.
    let db = conn.database("notes");
    assert!(!wait(|cb| db.exists(cb)).unwrap());
    assert!(wait(|cb| db.create(cb)).unwrap());
    assert!(wait(|cb| db.exists(cb)).unwrap());
    let err = wait(|cb| db.create(cb)).unwrap_err();
    assert_eq!(err.domain().unwrap().error(), "file_exists");
    assert_eq!(wait(|cb| conn.list_databases(cb)).unwrap(), vec!["notes"]);

    // Step 3: save, update, reload a document.
    let doc = db.document("first").into_document();
    doc.set_field("title", "draft");
    let saved = wait(|cb| doc.save(cb)).unwrap();
    assert_eq!(saved.id, "first");
    let first_rev = saved.rev.clone();

    doc.set_field("title", "final");
    wait(|cb| doc.save(cb)).unwrap();
    assert_ne!(doc.rev(), Some(first_rev.clone()));

    let reader = db.document("first").into_document();
    let fields = wait(|cb| reader.load((), cb)).unwrap();
    assert_eq!(fields["title"], "final");
    assert_eq!(reader.rev(), doc.rev());

    let old = wait(|cb| reader.load(first_rev.as_str(), cb)).unwrap();
    assert_eq!(old["title"], "draft");

    // Step 4: a handle with a stale revision conflicts.
    let stale = db.document("first").into_document();
    stale.set_field("title", "lost update");
    let err = wait(|cb| stale.save(cb)).unwrap_err();
    assert!(err.domain().unwrap().is_conflict());

    // Step 5: server-assigned ids and copies.
    let generated = db.new_document();
    generated.set_field("kind", "note");
    let revision = wait(|cb| generated.save(cb)).unwrap();
    assert_eq!(generated.id(), Some(revision.id.clone()));

    let copied = wait(|cb| doc.copy("second", cb)).unwrap();
    assert_eq!(copied.id, "second");

    // Step 6: design document and views.
    let design = db.design("app");
    design.set_view("by_id", "function(doc) { emit(doc._id, null); }", None);
    design.set_view("count", "function(doc) { emit(null, 1); }", Some("_count"));
    design.set_show("detail", "function(doc, req) { return doc.title; }");
    wait(|cb| design.save(cb)).unwrap();

    let handle = db.document("_design/app");
    assert!(handle.is_design());
    let loaded = handle.into_design().unwrap();
    wait(|cb| loaded.load((), cb)).unwrap();
    assert_eq!(loaded.views().len(), 2);
    assert!(loaded.show_source("detail").is_some());

    let (info, rows) = wait(|cb| db.view(("app", "by_id"), cb)).unwrap();
    assert_eq!(info, ViewInfo { total: 3, offset: 0 });
    assert_eq!(rows.len(), 3);

    let (_, rows) = wait(|cb| db.view(("app", "by_id", query(json!({"key": "second"}))), cb)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "second");

    let (_, rows) = wait(|cb| design.query_view(("by_id", query(json!({"keys": ["second", "first"]}))), cb)).unwrap();
    let ids: Vec<&Value> = rows.iter().map(|row| &row["id"]).collect();
    assert_eq!(ids, vec!["second", "first"]);

    let (info, rows) = wait(|cb| db.view(("app", "count"), cb)).unwrap();
    assert_eq!(info, ViewInfo { total: 1, offset: 0 });
    assert_eq!(rows[0]["value"], 3);

    let (info, rows) = wait(|cb| db.all_docs(query(json!({"include_docs": true})), cb)).unwrap();
    assert_eq!(info.total, 4);
    assert!(rows.iter().all(|row| row["doc"]["_id"] == row["id"]));

    // Step 7: maintenance endpoints.
    assert!(wait(|cb| db.compact((), cb)).unwrap());
    assert!(wait(|cb| design.compact(cb)).unwrap());
    assert!(wait(|cb| db.view_cleanup(cb)).unwrap());
    assert!(wait(|cb| db.ensure_full_commit(cb)).unwrap());
    assert!(wait(|cb| db.set_revs_limit(7, cb)).unwrap());
    assert_eq!(wait(|cb| db.revs_limit(cb)).unwrap(), 7);

    let purged = wait(|cb| db.purge(query(json!({"first": [first_rev]})), cb)).unwrap();
    assert!(purged.contains_key("purged"));

    // Step 8: delete documents, then the database.
    assert!(wait(|cb| doc.destroy(cb)).unwrap());
    assert!(doc.is_deleted());
    let err = wait(|cb| reader.load((), cb)).unwrap_err();
    assert!(err.is_not_found());

    assert!(wait(|cb| db.destroy(cb)).unwrap());
    assert!(!wait(|cb| db.exists(cb)).unwrap());
    let err = wait(|cb| db.info(cb)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn credentials_travel_as_basic_auth() {
    let port = start(mock_server::app_with_credentials("admin", "secret"));

    let anonymous = connect(port, ConnectionConfig::new());
    let err = wait(|cb| anonymous.list_databases(cb)).unwrap_err();
    assert_eq!(err.domain().unwrap().error(), "unauthorized");

    let admin = connect(port, ConnectionConfig::new().credentials("admin", "secret"));
    let names = wait(|cb| admin.list_databases(cb)).unwrap();
    assert_eq!(names, vec!["_replicator", "_users"]);
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = std_listener.local_addr().unwrap().port();
    drop(std_listener);

    let conn = connect(port, ConnectionConfig::new());
    let err = wait(|cb| conn.info(cb)).unwrap_err();
    assert!(matches!(err, CouchError::Transport(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn continuations_run_inside_a_runtime() {
    let port = start(mock_server::app());
    let conn = connect(port, ConnectionConfig::new());

    let (tx, rx) = tokio::sync::oneshot::channel();
    conn.list_databases(move |outcome| {
        let _ = tx.send(outcome);
    });
    let names = rx.await.unwrap().unwrap();
    assert_eq!(names, vec!["_replicator", "_users"]);
}
