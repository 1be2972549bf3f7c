//! Resource resolution between file handles and wire formats.

use std::io::Write;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use futures::future::{join_all, try_join_all};
use serde_json::Value;
use tracing::{debug, warn};

use super::fields::{self, ResourceField, ResourceFormat};
use super::handle;
use crate::context::CallerContext;
use crate::error::{EngineError, Result};
use crate::store::{FileContent, FileStore, NewFile, StoredFile};
use crate::util::data_path;

/// Converts resource-field values between file handles and the forms an
/// API expects, and persists produced output back into the file store.
#[derive(Clone)]
pub struct ResourceResolver {
    file_store: Arc<dyn FileStore>,
}

impl ResourceResolver {
    pub fn new(file_store: Arc<dyn FileStore>) -> Self {
        Self { file_store }
    }

    /// Resolve every input resource field in `params` to the wire format
    /// its schema requests.
    ///
    /// Public http(s) URLs pass through untouched unless they embed a
    /// file handle. Anything else must be a recognizable handle; a
    /// non-handle fails the call, except for `optional_resource` fields
    /// where it passes through unchanged.
    pub async fn resolve_inputs(
        &self,
        params: Value,
        input_schema: &Value,
        _ctx: &CallerContext,
    ) -> Result<Value> {
        let resource_fields = fields::collect(input_schema);
        if resource_fields.is_empty() {
            return Ok(params);
        }

        let mut work: Vec<(String, Value, &ResourceField)> = Vec::new();
        for field in &resource_fields {
            for path in fields::expand(&field.data_path, &params) {
                match data_path::get_path(&params, &path) {
                    Some(value) if !value.is_null() => {
                        work.push((path, value.clone(), field));
                    }
                    _ => {}
                }
            }
        }
        if work.is_empty() {
            return Ok(params);
        }

        // Fan out; one bad handle fails the whole call — the downstream
        // API would otherwise receive garbage.
        let conversions = try_join_all(
            work.iter()
                .map(|(path, value, field)| self.resolve_input_value(path, value, field)),
        )
        .await?;

        let mut params = params;
        for ((path, _, _), replacement) in work.iter().zip(conversions) {
            if let Some(new_value) = replacement {
                data_path::set_path(&mut params, path, new_value);
            }
        }
        Ok(params)
    }

    /// Resolve one input value. `Ok(None)` means leave it unchanged.
    async fn resolve_input_value(
        &self,
        path: &str,
        value: &Value,
        field: &ResourceField,
    ) -> Result<Option<Value>> {
        if let Value::String(s) = value {
            if handle::is_public_url(s) {
                return match handle::handle_in_url(s) {
                    Some(file_id) => self.convert(&file_id, field.format).await.map(Some),
                    None => Ok(None),
                };
            }
        }

        match handle::parse_handle(value) {
            Some(file_id) => self.convert(&file_id, field.format).await.map(Some),
            None if field.optional_resource => Ok(None),
            None => Err(EngineError::InvalidResourceInput {
                path: path.to_string(),
                reason: "value is not a file handle or public URL".to_string(),
            }),
        }
    }

    async fn convert(&self, file_id: &str, format: ResourceFormat) -> Result<Value> {
        match format {
            ResourceFormat::Url => {
                let url = self.file_store.generate_url(file_id).await?;
                Ok(Value::String(url))
            }
            ResourceFormat::Base64 => {
                let bytes = self.file_store.read_file(file_id).await?;
                Ok(Value::String(
                    base64::engine::general_purpose::STANDARD.encode(&bytes),
                ))
            }
            ResourceFormat::Text => {
                let bytes = self.file_store.read_file(file_id).await?;
                Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            }
            ResourceFormat::Binary => {
                // JSON params cannot carry raw bytes; encode as a data
                // URL the multipart builder decodes back into a part.
                let bytes = self.file_store.read_file(file_id).await?;
                Ok(Value::String(format!(
                    "data:application/octet-stream;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(&bytes)
                )))
            }
            ResourceFormat::FilePath => {
                let bytes = self.file_store.read_file(file_id).await?;
                let path = write_temp_file(file_id, &bytes)?;
                Ok(Value::String(path))
            }
        }
    }

    /// Persist produced output resources into the file store and rewrite
    /// their references into the response body.
    ///
    /// Public-URL values are batched into one bulk creation; inline
    /// content (data URLs, raw base64, text) is created individually.
    /// Per-field persistence failures degrade gracefully; a missing
    /// canvas is fatal.
    pub async fn persist_outputs(
        &self,
        body: Value,
        output_schema: &Value,
        ctx: &CallerContext,
    ) -> Result<(Value, Vec<StoredFile>)> {
        let mut body = strip_omitted(&body, output_schema);

        let resource_fields = fields::collect(output_schema);
        let mut work: Vec<(String, Value, &ResourceField)> = Vec::new();
        for field in &resource_fields {
            for path in fields::expand(&field.data_path, &body) {
                match data_path::get_path(&body, &path) {
                    Some(value) if !value.is_null() => work.push((path, value.clone(), field)),
                    _ => {}
                }
            }
        }
        if work.is_empty() {
            return Ok((body, Vec::new()));
        }

        ctx.require_canvas()?;

        let mut url_batch: Vec<(String, NewFile)> = Vec::new();
        let mut inline: Vec<(String, NewFile)> = Vec::new();
        for (i, (path, value, field)) in work.iter().enumerate() {
            match prepare_output_file(value, field.format, &ctx.tool_name, i) {
                Some((new_file, batched)) => {
                    if batched {
                        url_batch.push((path.clone(), new_file));
                    } else {
                        inline.push((path.clone(), new_file));
                    }
                }
                None => {
                    warn!(path = path.as_str(), "unresolvable output resource value");
                }
            }
        }

        let mut created: Vec<StoredFile> = Vec::new();

        if !url_batch.is_empty() {
            let (paths, entries): (Vec<_>, Vec<_>) = url_batch.into_iter().unzip();
            match self.file_store.batch_create_files(ctx, entries).await {
                Ok(stored) => {
                    for (path, file) in paths.iter().zip(&stored) {
                        data_path::set_path(&mut body, path, Value::String(file.handle()));
                    }
                    created.extend(stored);
                }
                Err(err) if err.is_fatal_resource() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "bulk file creation failed; leaving URL fields unresolved");
                }
            }
        }

        if !inline.is_empty() {
            let results = join_all(inline.iter().map(|(_, new_file)| {
                let file_store = self.file_store.clone();
                let new_file = new_file.clone();
                async move { file_store.create_file(ctx, new_file).await }
            }))
            .await;
            for ((path, _), result) in inline.iter().zip(results) {
                match result {
                    Ok(file) => {
                        data_path::set_path(&mut body, path, Value::String(file.handle()));
                        created.push(file);
                    }
                    Err(err) if err.is_fatal_resource() => return Err(err),
                    Err(err) => {
                        warn!(path = path.as_str(), error = %err, "file creation failed; leaving field unresolved");
                    }
                }
            }
        }

        debug!(files = created.len(), "persisted output resources");
        Ok((body, created))
    }

    /// Persist a top-level binary response as a single file, bypassing
    /// schema-driven extraction entirely.
    pub async fn persist_binary(
        &self,
        bytes: Bytes,
        mime_type: &str,
        ctx: &CallerContext,
    ) -> Result<(Value, Vec<StoredFile>)> {
        ctx.require_canvas()?;

        let new_file = NewFile {
            name: output_file_name(&ctx.tool_name, mime_type, 0),
            mime_type: mime_type.to_string(),
            content: FileContent::Bytes(bytes),
        };
        let stored = self.file_store.create_file(ctx, new_file).await?;
        let body = serde_json::json!({ "file": stored.handle() });
        Ok((body, vec![stored]))
    }
}

/// Build the creation payload for one output value. Returns the file
/// and whether it belongs in the bulk URL batch. `None` when the value
/// cannot be interpreted.
fn prepare_output_file(
    value: &Value,
    format: ResourceFormat,
    tool_name: &str,
    index: usize,
) -> Option<(NewFile, bool)> {
    let s = value.as_str()?;

    if handle::is_data_url(s) {
        let (mime, bytes) = handle::decode_data_url(s)?;
        return Some((
            NewFile {
                name: output_file_name(tool_name, &mime, index),
                mime_type: mime,
                content: FileContent::Bytes(Bytes::from(bytes)),
            },
            false,
        ));
    }

    if handle::is_public_url(s) {
        let mime = mime_from_url(s);
        return Some((
            NewFile {
                name: output_file_name(tool_name, &mime, index),
                mime_type: mime,
                content: FileContent::ExternalUrl(s.to_string()),
            },
            true,
        ));
    }

    match format {
        ResourceFormat::Base64 | ResourceFormat::Binary => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(s).ok()?;
            let mime = "application/octet-stream".to_string();
            Some((
                NewFile {
                    name: output_file_name(tool_name, &mime, index),
                    mime_type: mime,
                    content: FileContent::Bytes(Bytes::from(bytes)),
                },
                false,
            ))
        }
        ResourceFormat::Text => Some((
            NewFile {
                name: output_file_name(tool_name, "text/plain", index),
                mime_type: "text/plain".to_string(),
                content: FileContent::Bytes(Bytes::copy_from_slice(s.as_bytes())),
            },
            false,
        )),
        _ => None,
    }
}

/// Recursively drop fields annotated `x-omit: true`, returning a new
/// structure. Never mutates the original.
pub fn strip_omitted(value: &Value, schema: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let properties = schema.get("properties").and_then(Value::as_object);
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, sub_value) in map {
                let sub_schema = properties.and_then(|p| p.get(key));
                if let Some(sub_schema) = sub_schema {
                    if sub_schema.get("x-omit").and_then(Value::as_bool) == Some(true) {
                        continue;
                    }
                    out.insert(key.clone(), strip_omitted(sub_value, sub_schema));
                } else {
                    out.insert(key.clone(), sub_value.clone());
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) => Value::Array(
                items
                    .iter()
                    .map(|item| strip_omitted(item, item_schema))
                    .collect(),
            ),
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

fn write_temp_file(file_id: &str, bytes: &[u8]) -> Result<String> {
    let temp = tempfile::Builder::new()
        .prefix(&format!("tool-{}-", short_id(file_id)))
        .tempfile()?;
    // The path must outlive this call; the destination API reads it.
    let (mut file, path) = temp.keep().map_err(|e| EngineError::Io(e.error))?;
    file.write_all(bytes)?;
    Ok(path.to_string_lossy().into_owned())
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}

fn output_file_name(tool_name: &str, mime_type: &str, index: usize) -> String {
    let base = if tool_name.is_empty() { "output" } else { tool_name };
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{base}-{index}-{}.{}", &tag[..8], extension_for(mime_type))
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "video/mp4" => "mp4",
        "text/plain" => "txt",
        "application/json" => "json",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

fn mime_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "txt" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}
