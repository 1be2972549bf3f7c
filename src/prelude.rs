//! Convenience re-exports for common use.

pub use crate::config::{ConfigStore, Credentials, HttpMethod, MethodConfig, PollingConfig};
pub use crate::context::CallerContext;
pub use crate::engine::{Engine, EngineSettings};
pub use crate::error::{EngineError, Result};
pub use crate::handler::{HandlerRequest, HandlerResponse, ResponseData};
pub use crate::store::{FileContent, FileStore, NewFile, StoredFile, UsageMeter};
