//! In-memory collaborators shared across integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use tycho::context::CallerContext;
use tycho::config::{ConfigStore, Credentials, MethodConfig};
use tycho::engine::Engine;
use tycho::error::{EngineError, Result};
use tycho::store::{FileContent, FileStore, NewFile, StoredFile, UsageMeter};

/// Config store backed by maps, counting loads to observe caching.
#[derive(Default)]
pub struct MemoryConfigStore {
    methods: Mutex<HashMap<String, MethodConfig>>,
    credentials: Mutex<HashMap<String, Credentials>>,
    pub method_loads: AtomicUsize,
    pub credential_loads: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_method(&self, toolset_key: &str, config: MethodConfig) {
        self.methods
            .lock()
            .unwrap()
            .insert(format!("{toolset_key}::{}", config.name), config);
    }

    pub fn set_credentials(&self, toolset_key: &str, credentials: Credentials) {
        self.credentials
            .lock()
            .unwrap()
            .insert(toolset_key.to_string(), credentials);
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_method_config(
        &self,
        toolset_key: &str,
        method_name: &str,
    ) -> Result<Option<MethodConfig>> {
        self.method_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .methods
            .lock()
            .unwrap()
            .get(&format!("{toolset_key}::{method_name}"))
            .cloned())
    }

    async fn get_credentials(&self, toolset_key: &str) -> Result<Credentials> {
        self.credential_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .get(toolset_key)
            .cloned()
            .unwrap_or_default())
    }
}

/// File store that records every creation and serves canned bytes.
pub struct MemoryFileStore {
    contents: Mutex<HashMap<String, Bytes>>,
    next_id: AtomicUsize,
    pub created: Mutex<Vec<NewFile>>,
    pub batch_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    /// When set, creation calls fail with this error code.
    pub fail_creates: Mutex<bool>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            created: Mutex::new(Vec::new()),
            batch_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            fail_creates: Mutex::new(false),
        }
    }

    pub fn put(&self, file_id: &str, bytes: &[u8]) {
        self.contents
            .lock()
            .unwrap()
            .insert(file_id.to_string(), Bytes::copy_from_slice(bytes));
    }

    fn store_one(&self, ctx: &CallerContext, file: NewFile) -> StoredFile {
        let id = format!("sf-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let size = match &file.content {
            FileContent::Bytes(b) => Some(b.len() as u64),
            FileContent::ExternalUrl(_) => None,
        };
        let stored = StoredFile {
            id: id.clone(),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size,
            canvas_id: ctx.canvas_id.clone(),
        };
        self.created.lock().unwrap().push(file);
        stored
    }
}

impl Default for MemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create_file(&self, ctx: &CallerContext, file: NewFile) -> Result<StoredFile> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_creates.lock().unwrap() {
            return Err(EngineError::Configuration("file store unavailable".into()));
        }
        Ok(self.store_one(ctx, file))
    }

    async fn batch_create_files(
        &self,
        ctx: &CallerContext,
        files: Vec<NewFile>,
    ) -> Result<Vec<StoredFile>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_creates.lock().unwrap() {
            return Err(EngineError::Configuration("file store unavailable".into()));
        }
        Ok(files
            .into_iter()
            .map(|file| self.store_one(ctx, file))
            .collect())
    }

    async fn read_file(&self, file_id: &str) -> Result<Bytes> {
        Ok(self
            .contents
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .unwrap_or_else(|| Bytes::from_static(b"stored-bytes")))
    }

    async fn generate_url(&self, file_id: &str) -> Result<String> {
        Ok(format!("https://files.example.com/signed/{file_id}"))
    }
}

/// Usage meter recording every notification.
#[derive(Default)]
pub struct RecordingUsageMeter {
    pub records: Mutex<Vec<(String, Value)>>,
}

impl RecordingUsageMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageMeter for RecordingUsageMeter {
    async fn record_usage(
        &self,
        ctx: &CallerContext,
        billing: &Value,
        _params: &Value,
    ) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .push((ctx.tool_name.clone(), billing.clone()));
        Ok(())
    }
}

/// Everything an engine test needs, with the collaborators retained
/// for inspection.
pub struct TestHarness {
    pub engine: Engine,
    pub config_store: Arc<MemoryConfigStore>,
    pub file_store: Arc<MemoryFileStore>,
    pub usage_meter: Arc<RecordingUsageMeter>,
}

impl TestHarness {
    pub fn new() -> Self {
        let config_store = Arc::new(MemoryConfigStore::new());
        let file_store = Arc::new(MemoryFileStore::new());
        let usage_meter = Arc::new(RecordingUsageMeter::new());
        let engine = Engine::new(
            config_store.clone(),
            file_store.clone(),
            usage_meter.clone(),
        );
        Self {
            engine,
            config_store,
            file_store,
            usage_meter,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn ctx_with_canvas() -> CallerContext {
    CallerContext::builder()
        .user_id("u-1")
        .canvas_id("canvas-1")
        .build()
}
