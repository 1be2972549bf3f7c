//! File-handle recognition and parsing.
//!
//! A handle references content in the external blob store. Callers may
//! pass one in a small set of encodings: a bare id, `file://<id>`, an
//! `@file:<id>` mention, or an object carrying an id-bearing property.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

const SCHEME_PREFIX: &str = "file://";
const MENTION_PREFIX: &str = "@file:";

/// Object keys checked, in order, for an id-bearing property.
const ID_KEYS: [&str; 3] = ["file_id", "fileId", "id"];

fn bare_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{8,64}$").expect("valid regex"))
}

/// Extract a file id from any recognized handle encoding.
pub fn parse_handle(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => parse_handle_str(s),
        Value::Object(map) => ID_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn parse_handle_str(s: &str) -> Option<String> {
    if let Some(id) = s.strip_prefix(SCHEME_PREFIX) {
        return (!id.is_empty()).then(|| id.to_string());
    }
    if let Some(id) = s.strip_prefix(MENTION_PREFIX) {
        return (!id.is_empty()).then(|| id.to_string());
    }
    if bare_id_re().is_match(s) {
        return Some(s.to_string());
    }
    None
}

/// Whether a string is a public http(s) URL.
pub fn is_public_url(s: &str) -> bool {
    let lowered = s.to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// Whether a string is an inline `data:` URL.
pub fn is_data_url(s: &str) -> bool {
    s.starts_with("data:")
}

/// Extract a file handle embedded in a public URL: a `file_id`/`fileId`
/// query parameter, or the path segment following `/files/`.
pub fn handle_in_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;

    for (key, value) in parsed.query_pairs() {
        if (key == "file_id" || key == "fileId") && !value.is_empty() {
            return Some(value.into_owned());
        }
    }

    let mut segments = parsed.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "files" {
            if let Some(id) = segments.next() {
                if bare_id_re().is_match(id) {
                    return Some(id.to_string());
                }
            }
            return None;
        }
    }
    None
}

/// Decode a `data:` URL into its mime type and bytes.
pub fn decode_data_url(s: &str) -> Option<(String, Vec<u8>)> {
    use base64::Engine;

    let rest = s.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let (mime, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime = if mime.is_empty() {
        "text/plain".to_string()
    } else {
        mime.to_string()
    };
    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, bytes))
}
