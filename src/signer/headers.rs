//! Generic auth header injection.

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::config::Credentials;

const API_KEY_TEMPLATE: &str = "${apiKey}";

/// Inject authentication into the header set.
///
/// Resolution order — first matching rule wins, never cumulative:
/// 1. a `${apiKey}` template already present in a header, substituted
///    literally;
/// 2. a custom header name for the API key;
/// 3. default `Bearer <api_key>`;
/// 4. HTTP Basic from username/password;
/// 5. `Bearer <access_token>` for OAuth tokens.
pub fn inject_auth_headers(credentials: &Credentials, headers: &mut HeaderMap) {
    if let Some(api_key) = credentials.api_key() {
        if substitute_template(headers, api_key) {
            return;
        }

        if let Some(header_name) = credentials.api_key_header() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(header_name.as_bytes()),
                HeaderValue::from_str(api_key),
            ) {
                headers.insert(name, value);
                return;
            }
        }

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
            headers.insert(AUTHORIZATION, value);
        }
        return;
    }

    if let (Some(username), Some(password)) = (credentials.username(), credentials.password()) {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        if let Ok(value) = HeaderValue::from_str(&format!("Basic {encoded}")) {
            headers.insert(AUTHORIZATION, value);
        }
        return;
    }

    if let Some(token) = credentials.access_token() {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
    }
}

/// Substitute `${apiKey}` wherever it already appears in a header value.
fn substitute_template(headers: &mut HeaderMap, api_key: &str) -> bool {
    let targets: Vec<(HeaderName, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            let text = value.to_str().ok()?;
            text.contains(API_KEY_TEMPLATE)
                .then(|| (name.clone(), text.replace(API_KEY_TEMPLATE, api_key)))
        })
        .collect();

    let mut substituted = false;
    for (name, replaced) in targets {
        if let Ok(value) = HeaderValue::from_str(&replaced) {
            headers.insert(name, value);
            substituted = true;
        }
    }
    substituted
}
