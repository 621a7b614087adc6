//! Path and query-string encoding for server-relative request paths.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'+')
    .add(b'&')
    .add(b'=');

pub const DESIGN_PREFIX: &str = "_design/";

/// Percent-encode one path segment, including any `/`.
pub fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// Encode a document id. The slash of a `_design/` prefix stays literal.
pub fn document_id(id: &str) -> String {
    match id.strip_prefix(DESIGN_PREFIX) {
        Some(name) => format!("{DESIGN_PREFIX}{}", segment(name)),
        None => segment(id),
    }
}

/// `?k=v&…` where each value is JSON-stringified, then form-url-encoded.
///
/// Returns an empty string for an absent or empty map.
pub fn json_query(params: Option<&Map<String, Value>>) -> String {
    let Some(params) = params.filter(|p| !p.is_empty()) else {
        return String::new();
    };
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, &value.to_string());
    }
    format!("?{}", serializer.finish())
}

/// `?k=v&…` for plain string parameters such as `rev`.
pub fn plain_query<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in params {
        serializer.append_pair(key, value);
        any = true;
    }
    if any {
        format!("?{}", serializer.finish())
    } else {
        String::new()
    }
}
