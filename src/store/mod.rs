//! Collaborator seams: blob/file store and usage metering.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CallerContext;
use crate::error::Result;

/// A file owned by the external blob store. The engine only creates or
/// dereferences these; it never manages their lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub canvas_id: Option<String>,
}

impl StoredFile {
    /// Handle form written back into response bodies. Round-trips
    /// through input resolution on a later call.
    pub fn handle(&self) -> String {
        format!("file://{}", self.id)
    }
}

/// Payload for creating one file in the blob store.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    pub content: FileContent,
}

/// Where the new file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileContent {
    /// In-memory bytes, stored directly.
    Bytes(Bytes),
    /// A public URL the store fetches itself.
    ExternalUrl(String),
}

/// Blob/file store collaborator.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_file(&self, ctx: &CallerContext, file: NewFile) -> Result<StoredFile>;

    /// Create many files in one bulk commit. Exists so a response
    /// referencing many resources costs one store transaction, not N.
    async fn batch_create_files(
        &self,
        ctx: &CallerContext,
        files: Vec<NewFile>,
    ) -> Result<Vec<StoredFile>>;

    /// Read a stored file's bytes by handle id.
    async fn read_file(&self, file_id: &str) -> Result<Bytes>;

    /// Generate a signed/public URL for a stored file.
    async fn generate_url(&self, file_id: &str) -> Result<String>;
}

/// Usage-metering collaborator, notified fire-and-forget after a
/// successful call.
#[async_trait]
pub trait UsageMeter: Send + Sync {
    async fn record_usage(
        &self,
        ctx: &CallerContext,
        billing: &Value,
        params: &Value,
    ) -> Result<()>;
}
