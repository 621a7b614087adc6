//! Result shapes handle methods deliver, and the helpers that build them from
//! raw parsed responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CouchError;

/// Paging information of a view-shaped response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub total: u64,
    pub offset: u64,
}

/// Rows of a view-shaped response, in server order.
pub type Rows = Vec<Value>;

/// Identifier and revision acknowledged for a written document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub rev: String,
}

/// Wrap `callback` so a successful raw value is reshaped by `shape` first.
///
/// Errors pass through untouched.
pub(crate) fn reshape<T, F, S>(callback: F, shape: S) -> impl FnOnce(Result<Value, CouchError>) + Send + 'static
where
    T: 'static,
    F: FnOnce(Result<T, CouchError>) + Send + 'static,
    S: FnOnce(Value) -> Result<T, CouchError> + Send + 'static,
{
    move |outcome| callback(outcome.and_then(shape))
}

/// `{ok: true}` collapses to `true`; anything else to `false`.
pub(crate) fn acknowledged(value: Value) -> Result<bool, CouchError> {
    Ok(value.get("ok").and_then(Value::as_bool).unwrap_or(false))
}

pub(crate) fn object(value: Value) -> Result<Map<String, Value>, CouchError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CouchError::Shape(format!("expected a JSON object, got {other}"))),
    }
}

pub(crate) fn string_list(value: Value) -> Result<Vec<String>, CouchError> {
    serde_json::from_value(value).map_err(|e| CouchError::Shape(format!("expected a list of strings: {e}")))
}

/// Split `{total_rows, offset, rows}` into paging info and rows.
///
/// Reduce output carries only `rows`; its total falls back to the row count
/// and its offset to zero.
pub(crate) fn view_rows(value: Value) -> Result<(ViewInfo, Rows), CouchError> {
    let mut map = object(value)?;
    let rows = match map.remove("rows") {
        Some(Value::Array(rows)) => rows,
        Some(other) => return Err(CouchError::Shape(format!("`rows` is not a list: {other}"))),
        None => return Err(CouchError::Shape("view response has no `rows`".to_string())),
    };
    let info = ViewInfo {
        total: map
            .get("total_rows")
            .and_then(Value::as_u64)
            .unwrap_or(rows.len() as u64),
        offset: map.get("offset").and_then(Value::as_u64).unwrap_or(0),
    };
    Ok((info, rows))
}

/// Extract `{id, rev}` from a write acknowledgment.
pub(crate) fn revision(value: Value) -> Result<Revision, CouchError> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CouchError::Shape(format!("write acknowledgment has no `{name}`")))
    };
    Ok(Revision {
        id: field("id")?,
        rev: field("rev")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn view_rows_splits_info_and_rows() {
        let (info, rows) = view_rows(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [{"id": "a", "key": "a", "value": null}, {"id": "b", "key": "b", "value": null}]
        }))
        .unwrap();
        assert_eq!(info, ViewInfo { total: 2, offset: 0 });
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], "b");
    }

    #[test]
    fn reduce_output_defaults_total_and_offset() {
        let (info, rows) = view_rows(json!({"rows": [{"key": null, "value": 42}]})).unwrap();
        assert_eq!(info, ViewInfo { total: 1, offset: 0 });
        assert_eq!(rows[0]["value"], 42);
    }

    #[test]
    fn missing_rows_is_a_shape_error() {
        assert!(matches!(view_rows(json!({"total_rows": 0})), Err(CouchError::Shape(_))));
        assert!(matches!(view_rows(json!([])), Err(CouchError::Shape(_))));
    }

    #[test]
    fn acknowledgment_collapses_to_bool() {
        assert!(acknowledged(json!({"ok": true})).unwrap());
        assert!(!acknowledged(json!({"ok": false})).unwrap());
        assert!(!acknowledged(json!({})).unwrap());
    }

    #[test]
    fn revision_requires_id_and_rev() {
        let rev = revision(json!({"ok": true, "id": "doc", "rev": "1-a"})).unwrap();
        assert_eq!(rev, Revision { id: "doc".to_string(), rev: "1-a".to_string() });
        assert!(matches!(revision(json!({"ok": true, "id": "doc"})), Err(CouchError::Shape(_))));
    }

    #[test]
    fn reshape_passes_errors_through() {
        let (tx, rx) = std::sync::mpsc::channel();
        let wrapped = reshape(move |outcome: Result<bool, CouchError>| tx.send(outcome).unwrap(), acknowledged);
        wrapped(Err(CouchError::Shape("boom".to_string())));
        assert!(matches!(rx.recv().unwrap(), Err(CouchError::Shape(msg)) if msg == "boom"));
    }
}
