//! Error types for the execution engine.

use thiserror::Error;

/// Primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("method '{method}' not found in toolset '{toolset}'")]
    MethodNotFound { toolset: String, method: String },

    #[error("invalid polling status URL: {0}")]
    InvalidPollingUrl(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("no task identifier found in async job response")]
    PollingTaskIdNotFound,

    #[error("task failed: {message}")]
    TaskFailed {
        message: String,
        provider_code: Option<i64>,
    },

    #[error("polling timed out after {waited_secs}s")]
    PollingTimeout { waited_secs: u64 },

    #[error("invalid resource input at '{path}': {reason}")]
    InvalidResourceInput { path: String, reason: String },

    #[error("no canvas context available to persist produced files")]
    MissingCanvasContext,

    #[error("pre-handler failed: {0}")]
    PreHandler(String),

    #[error("post-handler failed: {0}")]
    PostHandler(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification used for logging and retry decisions upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Provider,
    Resource,
    Timeout,
    Internal,
}

impl EngineError {
    /// Create an API error from a status code and body text.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a terminal task failure with the provider's error text.
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self::TaskFailed {
            message: message.into(),
            provider_code: None,
        }
    }

    /// Stable machine-readable code surfaced in error responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            Self::InvalidPollingUrl(_) => "INVALID_POLLING_URL",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Api { .. } => "API_ERROR",
            Self::PollingTaskIdNotFound => "POLLING_TASK_ID_NOT_FOUND",
            Self::TaskFailed { .. } => "TASK_FAILED",
            Self::PollingTimeout { .. } => "POLLING_TIMEOUT",
            Self::InvalidResourceInput { .. } => "INVALID_RESOURCE_INPUT",
            Self::MissingCanvasContext => "MISSING_CANVAS_CONTEXT",
            Self::PreHandler(_) => "PRE_HANDLER_ERROR",
            Self::PostHandler(_) => "POST_HANDLER_ERROR",
            Self::Handler(_) => "HANDLER_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::MethodNotFound { .. }
            | Self::InvalidPollingUrl(_)
            | Self::InvalidArgument(_) => ErrorCategory::Configuration,
            Self::Network(_) | Self::Api { .. } => ErrorCategory::Transport,
            Self::PollingTaskIdNotFound | Self::TaskFailed { .. } => ErrorCategory::Provider,
            Self::PollingTimeout { .. } => ErrorCategory::Timeout,
            Self::InvalidResourceInput { .. } | Self::MissingCanvasContext => {
                ErrorCategory::Resource
            }
            _ => ErrorCategory::Internal,
        }
    }

    /// HTTP status equivalent for terminal outcomes, where one exists.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::PollingTimeout { .. } => Some(408),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error must re-throw through the post-handler stage
    /// instead of being swallowed. Only the missing-canvas resource error
    /// qualifies: swallowing it would silently drop produced artifacts.
    pub fn is_fatal_resource(&self) -> bool {
        matches!(self, Self::MissingCanvasContext)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, EngineError>;
