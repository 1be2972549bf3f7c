//! Method, polling, and credential configuration.
//!
//! Everything here is owned by the embedding platform's configuration
//! store and read-only to the engine: one [`MethodConfig`] per callable
//! operation, loaded per call and never mutated.

use std::collections::HashMap;

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{EngineError, Result};

/// HTTP method for an operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One callable operation: endpoint, schemas, auth-free wire settings,
/// and optional async-polling rules.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct MethodConfig {
    #[builder(into)]
    pub name: String,

    #[builder(into, default)]
    #[serde(default)]
    pub description: String,

    /// Endpoint URL template.
    #[builder(into)]
    pub endpoint: String,

    #[builder(default)]
    #[serde(default)]
    pub http_method: HttpMethod,

    #[builder(default = empty_object())]
    #[serde(default = "empty_object")]
    pub input_schema: Value,

    #[builder(default = empty_object())]
    #[serde(default = "empty_object")]
    pub output_schema: Value,

    /// Per-call timeout in seconds. Engine default applies when absent.
    pub timeout_secs: Option<u64>,

    #[builder(default)]
    #[serde(default)]
    pub retries: u32,

    /// Send the body as multipart form-data instead of JSON.
    #[builder(default)]
    #[serde(default)]
    pub form_data: bool,

    pub polling: Option<PollingConfig>,

    /// Opaque billing rule forwarded verbatim to the usage meter.
    pub billing: Option<Value>,

    #[builder(default)]
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

fn default_max_wait() -> u64 {
    60
}

fn default_interval() -> u64 {
    2
}

/// Async-completion polling rules for a method.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Absolute status-check URL template containing `{id}` (or
    /// `{task_id}`).
    #[builder(into)]
    pub status_url: String,

    #[builder(default = default_max_wait())]
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    #[builder(default = default_interval())]
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Explicit dotted path to the status field. Heuristic detection
    /// applies when absent.
    pub status_path: Option<String>,

    /// Explicit dotted path to the result payload.
    pub result_path: Option<String>,

    /// Status values treated as completed (case-insensitive). Defaults
    /// apply when absent.
    pub completed_values: Option<Vec<String>>,

    /// Status values treated as failed (case-insensitive).
    pub failed_values: Option<Vec<String>>,

    /// Body template for POST-style status checks, with `{task_id}`
    /// placeholders.
    pub request_body: Option<Value>,
}

impl PollingConfig {
    /// Validate the wire contract before any network call: the template
    /// must be an absolute http(s) URL and carry a task-id placeholder.
    pub fn validate(&self) -> Result<()> {
        let lowered = self.status_url.to_ascii_lowercase();
        if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
            return Err(EngineError::InvalidPollingUrl(format!(
                "status URL must be absolute http(s), got '{}'",
                self.status_url
            )));
        }
        if reqwest::Url::parse(&self.status_url.replace("{id}", "x").replace("{task_id}", "x"))
            .is_err()
        {
            return Err(EngineError::InvalidPollingUrl(self.status_url.clone()));
        }
        if !self.status_url.contains("{id}") && !self.status_url.contains("{task_id}") {
            return Err(EngineError::InvalidPollingUrl(format!(
                "status URL '{}' has no {{id}} or {{task_id}} placeholder",
                self.status_url
            )));
        }
        Ok(())
    }

    /// Attempt budget: `ceil(max_wait / interval)`, at least one.
    pub fn max_attempts(&self) -> u64 {
        let interval = self.interval_secs.max(1);
        self.max_wait_secs.div_ceil(interval).max(1)
    }

    /// Completed status values, lowercased, defaults applied.
    pub fn completed_set(&self) -> Vec<String> {
        self.completed_values
            .clone()
            .unwrap_or_else(|| {
                ["completed", "succeeded", "success", "done", "finished"]
                    .map(String::from)
                    .to_vec()
            })
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect()
    }

    /// Failed status values, lowercased, defaults applied.
    pub fn failed_set(&self) -> Vec<String> {
        self.failed_values
            .clone()
            .unwrap_or_else(|| {
                ["failed", "error", "canceled", "cancelled"]
                    .map(String::from)
                    .to_vec()
            })
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect()
    }
}

/// Loosely-typed credential map for one toolset.
///
/// Passed by value into one call and never persisted by the engine. The
/// `Debug` impl is redacted so credentials cannot leak through logs.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials(Value);

impl Credentials {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Look up a key, tolerating both snake_case and camelCase spellings.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        let camel = snake_to_camel(key);
        self.0
            .get(key)
            .or_else(|| self.0.get(&camel))
            .and_then(Value::as_str)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get_str("api_key")
    }

    /// Custom header name the API key should be sent under.
    pub fn api_key_header(&self) -> Option<&str> {
        self.get_str("api_key_header")
    }

    pub fn username(&self) -> Option<&str> {
        self.get_str("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.get_str("password")
    }

    pub fn access_token(&self) -> Option<&str> {
        self.get_str("access_token")
    }

    /// Nested `auth` block, when present.
    pub fn auth_block(&self) -> Option<&Value> {
        self.0.get("auth").filter(|v| v.is_object())
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credentials").field(&"..").finish()
    }
}

/// Configuration store collaborator. Owned by the embedding platform.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch one method's configuration, `None` when the toolset has no
    /// such method.
    async fn get_method_config(
        &self,
        toolset_key: &str,
        method_name: &str,
    ) -> Result<Option<MethodConfig>>;

    /// Fetch the toolset's credentials.
    async fn get_credentials(&self, toolset_key: &str) -> Result<Credentials>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polling(url: &str) -> PollingConfig {
        PollingConfig::builder().status_url(url).build()
    }

    #[test]
    fn relative_status_url_is_rejected() {
        let err = polling("/v1/tasks/{id}").validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_POLLING_URL");
    }

    #[test]
    fn status_url_without_placeholder_is_rejected() {
        let err = polling("https://api.example.com/tasks").validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_POLLING_URL");
    }

    #[test]
    fn absolute_status_url_with_placeholder_is_accepted() {
        assert!(polling("https://api.example.com/tasks/{id}").validate().is_ok());
        assert!(polling("https://api.example.com/tasks/{task_id}")
            .validate()
            .is_ok());
    }

    #[test]
    fn attempts_round_up() {
        let cfg = PollingConfig::builder()
            .status_url("https://x/{id}")
            .max_wait_secs(10)
            .interval_secs(3)
            .build();
        assert_eq!(cfg.max_attempts(), 4);
    }

    #[test]
    fn zero_interval_does_not_divide_by_zero() {
        let cfg = PollingConfig::builder()
            .status_url("https://x/{id}")
            .max_wait_secs(10)
            .interval_secs(0)
            .build();
        assert_eq!(cfg.max_attempts(), 10);
    }

    #[test]
    fn credentials_tolerate_camel_case() {
        let creds = Credentials::new(serde_json::json!({
            "apiKey": "k-123",
            "accessToken": "t-456",
        }));
        assert_eq!(creds.api_key(), Some("k-123"));
        assert_eq!(creds.access_token(), Some("t-456"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new(serde_json::json!({"api_key": "secret"}));
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn method_config_deserializes_with_defaults() {
        let cfg: MethodConfig = serde_json::from_value(serde_json::json!({
            "name": "search",
            "endpoint": "https://api.example.com/search",
        }))
        .unwrap();
        assert_eq!(cfg.http_method, HttpMethod::Post);
        assert!(!cfg.form_data);
        assert!(cfg.polling.is_none());
        assert!(cfg.input_schema.is_object());
    }
}
