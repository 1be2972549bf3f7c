//! Outbound HTTP execution: one call, synchronous or async-polled.
//!
//! The adapter owns the wire-level state machine
//! `PREPARING → SENT → (DONE | POLLING → (DONE | FAILED | TIMED_OUT))`.
//! Each call constructs its own adapter; nothing here is shared across
//! concurrent calls except the HTTP connection pool.

pub mod detect;
pub mod polling;

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use crate::config::{Credentials, HttpMethod, PollingConfig};
use crate::error::{EngineError, Result};
use crate::resource::handle;
use crate::signer::{canonical, headers::inject_auth_headers, SignerStrategy};

pub use polling::PollStrategy;

/// Display label the orchestrating layer attaches to a tool call;
/// purely cosmetic, stripped before dispatch.
const COSMETIC_NAME_FIELD: &str = "_name";

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Wire-level request for one outbound call.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub endpoint: String,
    pub method: HttpMethod,
    pub params: Value,
    pub credentials: Credentials,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub form_data: bool,
}

/// Fully-materialized response body. No open streams reach a
/// post-handler.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Binary { bytes: Bytes, mime_type: String },
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Binary { .. } => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }
}

/// Wire-level response.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// Executes one outbound call, driving polling to completion when the
/// method is async.
#[derive(Debug)]
pub struct HttpAdapter {
    client: reqwest::Client,
    signer: SignerStrategy,
    polling: Option<PollingConfig>,
}

impl HttpAdapter {
    /// Build an adapter, validating the polling wire contract before
    /// any network call.
    pub fn new(signer: SignerStrategy, polling: Option<PollingConfig>) -> Result<Self> {
        if let Some(config) = &polling {
            config.validate()?;
        }
        Ok(Self {
            client: shared_client().clone(),
            signer,
            polling,
        })
    }

    pub async fn execute(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        // PREPARING
        let mut params = request.params;
        if let Some(obj) = params.as_object_mut() {
            obj.remove(COSMETIC_NAME_FIELD);
        }

        let mut url = reqwest::Url::parse(&request.endpoint)
            .map_err(|e| EngineError::Configuration(format!("bad endpoint '{}': {e}", request.endpoint)))?;

        if let SignerStrategy::Canonical(config) = &self.signer {
            if let Some(action) = &config.action {
                url.query_pairs_mut().append_pair("Action", action);
                if let Some(version) = &config.version {
                    url.query_pairs_mut().append_pair("Version", version);
                }
            }
        }

        let is_query_call = matches!(request.method, HttpMethod::Get | HttpMethod::Delete);
        if is_query_call {
            append_query_params(&mut url, &params);
        }

        let body_bytes: Vec<u8> = if is_query_call || request.form_data {
            Vec::new()
        } else {
            serde_json::to_vec(&params)?
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        match &self.signer {
            SignerStrategy::Headers => inject_auth_headers(&request.credentials, &mut headers),
            SignerStrategy::Canonical(config) => {
                let signed = canonical::sign_request(
                    config,
                    &request.method.as_reqwest(),
                    &url,
                    &body_bytes,
                    Utc::now(),
                )?;
                headers.extend(signed);
            }
            SignerStrategy::Unsigned => {}
        }

        debug!(
            endpoint = url.as_str(),
            method = %request.method,
            form_data = request.form_data,
            "dispatching tool call"
        );

        let mut builder = self
            .client
            .request(request.method.as_reqwest(), url)
            .timeout(request.timeout);
        if request.form_data {
            builder = builder.multipart(build_form(&params)?);
        } else if !is_query_call {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            builder = builder.body(body_bytes);
        }
        let response = builder.headers(headers).send().await?;

        // SENT
        let status = response.status();
        let response_headers = response.headers().clone();
        let content_type = response_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(EngineError::api(
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        let Some(config) = &self.polling else {
            // DONE: the initial response is the result.
            return Ok(AdapterResponse {
                status: status.as_u16(),
                headers: response_headers,
                body: parse_body(content_type.as_deref(), bytes),
            });
        };

        // POLLING
        let initial: Value = serde_json::from_slice(&bytes)?;
        let strategy = match &self.signer {
            SignerStrategy::Canonical(hmac) => PollStrategy::Signed(hmac.clone()),
            _ => PollStrategy::Generic,
        };
        let mut poll_headers = HeaderMap::new();
        if matches!(self.signer, SignerStrategy::Headers) {
            inject_auth_headers(&request.credentials, &mut poll_headers);
        }

        let result = polling::run(&self.client, config, &strategy, &poll_headers, &initial).await?;
        Ok(AdapterResponse {
            status: 200,
            headers: response_headers,
            body: ResponseBody::Json(result),
        })
    }
}

fn append_query_params(url: &mut reqwest::Url, params: &Value) {
    let Some(obj) = params.as_object() else {
        return;
    };
    let mut pairs = url.query_pairs_mut();
    for (key, value) in obj {
        match value {
            Value::String(s) => {
                pairs.append_pair(key, s);
            }
            Value::Number(n) => {
                pairs.append_pair(key, &n.to_string());
            }
            Value::Bool(b) => {
                pairs.append_pair(key, if *b { "true" } else { "false" });
            }
            Value::Null => {}
            other => {
                pairs.append_pair(key, &other.to_string());
            }
        }
    }
}

/// Build a multipart form from the params object. Data-URL strings
/// (produced by binary resource resolution) become byte parts;
/// everything else is sent as text.
fn build_form(params: &Value) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    let Some(obj) = params.as_object() else {
        return Ok(form);
    };
    for (key, value) in obj {
        match value {
            Value::String(s) if handle::is_data_url(s) => {
                let (mime, bytes) = handle::decode_data_url(s).ok_or_else(|| {
                    EngineError::InvalidArgument(format!("malformed data URL in field '{key}'"))
                })?;
                let part = reqwest::multipart::Part::bytes(bytes)
                    .file_name(key.clone())
                    .mime_str(&mime)?;
                form = form.part(key.clone(), part);
            }
            Value::String(s) => {
                form = form.text(key.clone(), s.clone());
            }
            other => {
                form = form.text(key.clone(), other.to_string());
            }
        }
    }
    Ok(form)
}

/// Classify a response body from its Content-Type. Unknown or absent
/// types attempt a JSON parse and fall back to raw bytes.
fn parse_body(content_type: Option<&str>, bytes: Bytes) -> ResponseBody {
    let ct = content_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if ct.contains("json") {
        return match serde_json::from_slice(&bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Binary {
                bytes,
                mime_type: ct,
            },
        };
    }
    if ct.starts_with("text/") {
        return ResponseBody::Json(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }
    if ct.is_empty() {
        return match serde_json::from_slice(&bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Binary {
                bytes,
                mime_type: "application/octet-stream".to_string(),
            },
        };
    }
    ResponseBody::Binary {
        bytes,
        mime_type: ct,
    }
}
