//! Handler pipeline: one pre-handler, one adapter call, one
//! post-handler, with per-stage failure isolation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::adapter::{AdapterRequest, HttpAdapter, ResponseBody};
use crate::config::{Credentials, MethodConfig};
use crate::context::CallerContext;
use crate::error::{EngineError, Result};
use crate::store::StoredFile;

/// Tool-call-level request.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub params: Value,
    /// Filled in by the pre-handler stage.
    pub credentials: Credentials,
    pub context: CallerContext,
}

/// Normalized call result. Binary bodies pass through as bytes; JSON
/// objects stay as-is; other primitives are wrapped under `result`.
#[derive(Debug, Clone)]
pub enum ResponseData {
    Json(Value),
    Binary { bytes: bytes::Bytes, mime_type: String },
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Binary { .. } => None,
        }
    }
}

/// Tool-call-level response. Every terminal outcome takes this shape;
/// callers never see a raw failure.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub success: bool,
    pub data: Option<ResponseData>,
    pub files: Vec<StoredFile>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub metadata: Option<Value>,
}

impl HandlerResponse {
    pub fn ok(data: ResponseData, files: Vec<StoredFile>) -> Self {
        Self {
            success: true,
            data: Some(data),
            files,
            error: None,
            error_code: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            files: Vec::new(),
            error: Some(message.into()),
            error_code: Some(code.into()),
            metadata: None,
        }
    }

    pub fn from_engine_error(err: &EngineError) -> Self {
        Self::error(err.to_string(), err.error_code())
    }

    /// JSON payload, if the call produced one.
    pub fn json(&self) -> Option<&Value> {
        self.data.as_ref().and_then(ResponseData::as_json)
    }
}

/// What a post-handler hands back: possibly-rewritten data plus any
/// files it persisted.
#[derive(Debug)]
pub struct PostOutcome {
    pub data: ResponseData,
    pub files: Vec<StoredFile>,
}

type PreHandlerFn = dyn Fn(HandlerRequest) -> Pin<Box<dyn Future<Output = Result<HandlerRequest>> + Send>>
    + Send
    + Sync;

type PostHandlerFn = dyn Fn(HandlerRequest, ResponseData) -> Pin<Box<dyn Future<Output = Result<PostOutcome>> + Send>>
    + Send
    + Sync;

/// Wraps one adapter call with a pre- and post-handler stage.
///
/// Each slot holds at most one handler; registering another replaces
/// it. Stage failures are isolated: a pre-handler failure skips the
/// adapter, an adapter failure skips the post-handler, and a
/// post-handler failure is swallowed — except the fatal resource error,
/// which re-throws to the caller.
pub struct Handler {
    adapter: HttpAdapter,
    method: Arc<MethodConfig>,
    default_timeout: Duration,
    pre: Option<Box<PreHandlerFn>>,
    post: Option<Box<PostHandlerFn>>,
}

impl Handler {
    pub fn new(adapter: HttpAdapter, method: Arc<MethodConfig>, default_timeout: Duration) -> Self {
        Self {
            adapter,
            method,
            default_timeout,
            pre: None,
            post: None,
        }
    }

    /// Register the pre-handler, replacing any prior one.
    pub fn set_pre_handler<F, Fut>(&mut self, f: F)
    where
        F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerRequest>> + Send + 'static,
    {
        self.pre = Some(Box::new(move |req| Box::pin(f(req))));
    }

    /// Register the post-handler, replacing any prior one.
    pub fn set_post_handler<F, Fut>(&mut self, f: F)
    where
        F: Fn(HandlerRequest, ResponseData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PostOutcome>> + Send + 'static,
    {
        self.post = Some(Box::new(move |req, data| Box::pin(f(req, data))));
    }

    /// Run the pipeline. The only error that escapes is the fatal
    /// resource error; every other failure becomes a structured error
    /// response.
    pub async fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse> {
        match self.run_stages(request).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_fatal_resource() => Err(err),
            Err(err) => {
                warn!(error = %err, "unexpected handler failure");
                Ok(HandlerResponse::error(err.to_string(), "HANDLER_ERROR"))
            }
        }
    }

    async fn run_stages(&self, request: HandlerRequest) -> Result<HandlerResponse> {
        let request = match &self.pre {
            Some(pre) => match pre(request).await {
                Ok(request) => request,
                Err(err) => {
                    return Ok(HandlerResponse::error(err.to_string(), "PRE_HANDLER_ERROR"));
                }
            },
            None => request,
        };

        let adapter_request = self.build_adapter_request(&request);
        let response = match self.adapter.execute(adapter_request).await {
            Ok(response) => response,
            Err(err) => {
                return Ok(HandlerResponse::error(
                    err.to_string(),
                    adapter_error_code(&err),
                ));
            }
        };

        // Normalize once, centrally: post-handlers see a uniform shape
        // regardless of what the provider returned.
        let shaped = shape_data(response.body);

        if let Some(post) = &self.post {
            match post(request.clone(), shaped.clone()).await {
                Ok(outcome) => {
                    return Ok(self.finish(request, outcome.data, outcome.files));
                }
                Err(err) if err.is_fatal_resource() => return Err(err),
                Err(err) => {
                    warn!(
                        tool = request.context.tool_name.as_str(),
                        error = %err,
                        "post-handler failed; returning adapter result"
                    );
                }
            }
        }

        Ok(self.finish(request, shaped, Vec::new()))
    }

    fn finish(
        &self,
        request: HandlerRequest,
        data: ResponseData,
        files: Vec<StoredFile>,
    ) -> HandlerResponse {
        let mut response = HandlerResponse::ok(data, files);
        response.metadata = Some(serde_json::json!({
            "tool_name": request.context.tool_name,
            "toolset_key": request.context.toolset_key,
        }));
        response
    }

    fn build_adapter_request(&self, request: &HandlerRequest) -> AdapterRequest {
        let timeout = self
            .method
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        AdapterRequest {
            endpoint: render_endpoint(&self.method.endpoint, &request.params),
            method: self.method.http_method,
            params: request.params.clone(),
            credentials: request.credentials.clone(),
            headers: self.method.default_headers.clone(),
            timeout,
            form_data: self.method.form_data,
        }
    }
}

/// Substitute top-level scalar params into `{placeholder}` segments of
/// the endpoint template.
fn render_endpoint(endpoint: &str, params: &Value) -> String {
    if !endpoint.contains('{') {
        return endpoint.to_string();
    }
    let Some(obj) = params.as_object() else {
        return endpoint.to_string();
    };
    let mut out = endpoint.to_string();
    for (key, value) in obj {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out = out.replace(&format!("{{{key}}}"), &rendered);
    }
    out
}

/// Errors with provider/polling semantics keep their own code; bare
/// transport and serialization failures surface as `EXECUTION_ERROR`.
fn adapter_error_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::Network(_) | EngineError::Io(_) | EngineError::Serialization(_) => {
            "EXECUTION_ERROR"
        }
        other => other.error_code(),
    }
}

fn shape_data(body: ResponseBody) -> ResponseData {
    match body {
        ResponseBody::Binary { bytes, mime_type } => ResponseData::Binary { bytes, mime_type },
        ResponseBody::Json(value) => match value {
            Value::Object(_) | Value::Array(_) => ResponseData::Json(value),
            primitive => ResponseData::Json(serde_json::json!({ "result": primitive })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_are_kept_as_is() {
        let shaped = shape_data(ResponseBody::Json(json!({"a": 1})));
        assert_eq!(shaped.as_json().unwrap(), &json!({"a": 1}));
    }

    #[test]
    fn arrays_are_kept_as_is() {
        let shaped = shape_data(ResponseBody::Json(json!([1, 2])));
        assert_eq!(shaped.as_json().unwrap(), &json!([1, 2]));
    }

    #[test]
    fn primitives_are_wrapped_under_result() {
        let shaped = shape_data(ResponseBody::Json(json!("plain text")));
        assert_eq!(shaped.as_json().unwrap(), &json!({"result": "plain text"}));

        let shaped = shape_data(ResponseBody::Json(json!(42)));
        assert_eq!(shaped.as_json().unwrap(), &json!({"result": 42}));
    }

    #[test]
    fn binary_passes_through() {
        let shaped = shape_data(ResponseBody::Binary {
            bytes: bytes::Bytes::from_static(b"\x89PNG"),
            mime_type: "image/png".into(),
        });
        assert!(matches!(shaped, ResponseData::Binary { .. }));
    }

    #[test]
    fn transport_errors_become_execution_error() {
        let err = EngineError::Serialization(serde_json::from_str::<Value>("{").unwrap_err());
        assert_eq!(adapter_error_code(&err), "EXECUTION_ERROR");
    }

    #[test]
    fn provider_errors_keep_their_own_code() {
        assert_eq!(
            adapter_error_code(&EngineError::PollingTimeout { waited_secs: 60 }),
            "POLLING_TIMEOUT"
        );
        assert_eq!(
            adapter_error_code(&EngineError::task_failed("x")),
            "TASK_FAILED"
        );
        assert_eq!(
            adapter_error_code(&EngineError::api(500, "boom")),
            "API_ERROR"
        );
    }

    #[test]
    fn endpoint_templates_render_scalar_params() {
        let out = render_endpoint(
            "https://api.example.com/models/{model}/predict",
            &json!({"model": "sdxl", "prompt": "cat"}),
        );
        assert_eq!(out, "https://api.example.com/models/sdxl/predict");
    }
}
