//! User key resolution.
//!
//! The key comes from the first of these that yields a non-empty value:
//! the `X-User-ID` header, the `userId` query parameter, the `userId` field
//! of a JSON request body.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri};
use serde_json::Value;

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Query parameter and body field carrying the caller's identity.
pub const USER_ID_FIELD: &str = "userId";
/// Key used when a rate-limited request carries no identity.
pub const ANONYMOUS: &str = "anonymous";

/// Resolve the caller's key, or `None` if the request names nobody.
pub fn resolve(headers: &HeaderMap, uri: &Uri, body: &[u8]) -> Option<String> {
    from_header(headers)
        .or_else(|| from_query(uri))
        .or_else(|| from_body(body))
}

/// Resolve the caller's key, falling back to [`ANONYMOUS`].
pub fn resolve_or_anonymous(headers: &HeaderMap, uri: &Uri, body: &[u8]) -> String {
    resolve(headers, uri, body).unwrap_or_else(|| ANONYMOUS.to_string())
}

/// Non-ASCII bytes are kept, with invalid UTF-8 replaced by U+FFFD.
fn from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(USER_ID_HEADER)?;
    Some(String::from_utf8_lossy(value.as_bytes()).into_owned()).filter(|v| !v.is_empty())
}

fn from_query(uri: &Uri) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove(USER_ID_FIELD).filter(|v| !v.is_empty())
}

fn from_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get(USER_ID_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
