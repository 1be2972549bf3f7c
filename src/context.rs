//! Caller context threaded explicitly through every call.

use bon::Builder;

/// Identity and destination for one tool call.
///
/// Constructed by the caller, enriched by the orchestrator with the
/// toolset/method being invoked, and passed by value through the handler,
/// resolver, and signer. Nothing in the engine reads ambient state.
#[derive(Debug, Clone, Builder, Default)]
pub struct CallerContext {
    /// Calling user identifier (forwarded to usage metering).
    #[builder(into)]
    pub user_id: Option<String>,

    /// Destination canvas for produced files. Output persistence fails
    /// with `MISSING_CANVAS_CONTEXT` when absent.
    #[builder(into)]
    pub canvas_id: Option<String>,

    /// Toolset being invoked. Filled in by the orchestrator.
    #[builder(into, default)]
    pub toolset_key: String,

    /// Method being invoked. Filled in by the orchestrator.
    #[builder(into, default)]
    pub tool_name: String,
}

impl CallerContext {
    /// The canvas id, or the fatal resource error when persistence is
    /// attempted without one.
    pub fn require_canvas(&self) -> crate::error::Result<&str> {
        self.canvas_id
            .as_deref()
            .ok_or(crate::error::EngineError::MissingCanvasContext)
    }
}
