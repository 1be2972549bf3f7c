//! Canonical-request HMAC-SHA256 signing.
//!
//! One provider family authenticates with a date-scoped signature over a
//! canonical rendering of the request. The canonical request is
//! `METHOD\nPATH\nSORTED_QUERY\nCANONICAL_HEADERS\n\nSIGNED_HEADERS\n
//! BODY_SHA256`; the signing key chains four HMACs (date → region →
//! service → "request"); the result travels in an `Authorization` header
//! of the form `HMAC-SHA256 Credential=..., SignedHeaders=...,
//! Signature=...`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use sha2::{Digest, Sha256};

use crate::config::Credentials;
use crate::error::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

const HMAC_AUTH_TYPES: [&str; 3] = ["hmac-sha256", "hmac_sha256", "hmac"];
const CREDENTIAL_SUFFIX: &str = "request";

/// Extracted signing configuration for the HMAC provider family.
#[derive(Debug, Clone)]
pub struct HmacConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub service: String,
    pub region: String,
    /// Provider action name, appended as an `Action` query parameter.
    pub action: Option<String>,
    /// API version, appended as a `Version` query parameter.
    pub version: Option<String>,
}

/// Whether the credentials declare this provider family's auth type,
/// either as a nested `auth` block or as an equivalent flat field set.
pub fn declares_hmac(credentials: &Credentials) -> bool {
    if let Some(block) = credentials.auth_block() {
        if let Some(auth_type) = block.get("type").and_then(serde_json::Value::as_str) {
            return HMAC_AUTH_TYPES.contains(&auth_type.to_ascii_lowercase().as_str());
        }
    }
    credentials.get_str("access_key_id").is_some()
        && credentials.get_str("secret_access_key").is_some()
}

impl HmacConfig {
    /// Extract a complete signing config, `None` when any required field
    /// is missing. Callers treat `None` as "send unsigned".
    pub fn from_credentials(credentials: &Credentials) -> Option<Self> {
        let block = credentials.auth_block();
        let lookup = |key: &str| -> Option<String> {
            block
                .and_then(|b| {
                    b.get(key)
                        .or_else(|| b.get(camel(key).as_str()))
                        .and_then(serde_json::Value::as_str)
                })
                .or_else(|| credentials.get_str(key))
                .map(str::to_string)
        };

        Some(Self {
            access_key_id: lookup("access_key_id")?,
            secret_access_key: lookup("secret_access_key")?,
            service: lookup("service")?,
            region: lookup("region")?,
            action: lookup("action"),
            version: lookup("version"),
        })
    }
}

fn camel(key: &str) -> String {
    let mut out = String::new();
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Sign one request, returning the headers to attach: `X-Date`,
/// `X-Content-Sha256`, `Content-Type`, and `Authorization`.
pub fn sign_request(
    config: &HmacConfig,
    method: &reqwest::Method,
    url: &reqwest::Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<HeaderMap> {
    let x_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let short_date = now.format("%Y%m%d").to_string();
    let body_hash = hex::encode(Sha256::digest(body));

    let host = host_with_port(url)
        .ok_or_else(|| EngineError::Configuration(format!("endpoint '{url}' has no host")))?;

    // Canonical headers, sorted by name, each `name:value\n`.
    let header_pairs = [
        ("content-type", "application/json"),
        ("host", host.as_str()),
        ("x-content-sha256", body_hash.as_str()),
        ("x-date", x_date.as_str()),
    ];
    let canonical_headers: String = header_pairs
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = header_pairs
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let query_pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        url.path(),
        canonical_query(&query_pairs),
        canonical_headers,
        signed_headers,
        body_hash,
    );

    let scope = format!(
        "{short_date}/{}/{}/{CREDENTIAL_SUFFIX}",
        config.region, config.service
    );
    let string_to_sign = format!(
        "HMAC-SHA256\n{x_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    // Date-scoped signing key: date → region → service → "request".
    let k_date = hmac_bytes(config.secret_access_key.as_bytes(), short_date.as_bytes());
    let k_region = hmac_bytes(&k_date, config.region.as_bytes());
    let k_service = hmac_bytes(&k_region, config.service.as_bytes());
    let k_signing = hmac_bytes(&k_service, CREDENTIAL_SUFFIX.as_bytes());
    let signature = hex::encode(hmac_bytes(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        config.access_key_id,
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("X-Date", header_value(&x_date)?);
    headers.insert("X-Content-Sha256", header_value(&body_hash)?);
    headers.insert(AUTHORIZATION, header_value(&authorization)?);
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| EngineError::Configuration(format!("unrepresentable header value: {e}")))
}

fn host_with_port(url: &reqwest::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn hmac_bytes(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sort query pairs lexicographically and percent-encode with the
/// provider's strict table: only ALPHA / DIGIT / `-` `.` `_` `~` pass
/// through, everything else (space included) is `%XX` with uppercase
/// hex. This matches the provider's SDKs, not `encodeURIComponent`.
pub fn canonical_query(pairs: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (strict_encode(k), strict_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn strict_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
