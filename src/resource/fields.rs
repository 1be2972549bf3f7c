//! Resource field collection from JSON Schemas.

use serde_json::Value;
use strum::{Display, EnumString};

use crate::util::data_path;

/// Wire form a resolved resource takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceFormat {
    /// Signed/public URL (default).
    #[default]
    Url,
    Base64,
    Text,
    Binary,
    /// Local filesystem path; the content is downloaded to temp storage.
    FilePath,
}

/// One schema field flagged as a resource. Derived per schema per call,
/// cheap to regenerate, never cached across schema versions.
#[derive(Debug, Clone)]
pub struct ResourceField {
    /// JSON Pointer into the schema, e.g.
    /// `/properties/images/items/properties/url`.
    pub pointer: String,
    /// Lodash-style data path with `[*]` wildcards, e.g.
    /// `images[*].url`.
    pub data_path: String,
    /// Whether the field sits under at least one array level.
    pub is_array_item: bool,
    /// Data-path prefixes that are arrays, outermost first.
    pub array_paths: Vec<String>,
    pub format: ResourceFormat,
    /// Set for fields inside `oneOf`/`anyOf` branches: non-resource
    /// alternatives exist, so a non-handle value there is not an error.
    pub optional_resource: bool,
}

/// Walk a schema and return every field flagged `isResource`.
pub fn collect(schema: &Value) -> Vec<ResourceField> {
    let mut out = Vec::new();
    walk(schema, String::new(), String::new(), Vec::new(), false, &mut out);
    out
}

fn walk(
    schema: &Value,
    pointer: String,
    path: String,
    array_paths: Vec<String>,
    in_union: bool,
    out: &mut Vec<ResourceField>,
) {
    let Some(obj) = schema.as_object() else {
        return;
    };

    if obj.get("isResource").and_then(Value::as_bool) == Some(true) {
        let format = obj
            .get("format")
            .and_then(Value::as_str)
            .and_then(|f| f.parse().ok())
            .unwrap_or_default();
        out.push(ResourceField {
            pointer: pointer.clone(),
            data_path: path.clone(),
            is_array_item: !array_paths.is_empty(),
            array_paths: array_paths.clone(),
            format,
            optional_resource: in_union,
        });
    }

    if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
        for (key, sub) in properties {
            walk(
                sub,
                format!("{pointer}/properties/{key}"),
                join_key(&path, key),
                array_paths.clone(),
                in_union,
                out,
            );
        }
    }

    if let Some(items) = obj.get("items") {
        let mut nested = array_paths.clone();
        nested.push(path.clone());
        walk(
            items,
            format!("{pointer}/items"),
            format!("{path}[*]"),
            nested,
            in_union,
            out,
        );
    }

    for keyword in ["oneOf", "anyOf"] {
        if let Some(branches) = obj.get(keyword).and_then(Value::as_array) {
            for (i, branch) in branches.iter().enumerate() {
                walk(
                    branch,
                    format!("{pointer}/{keyword}/{i}"),
                    path.clone(),
                    array_paths.clone(),
                    true,
                    out,
                );
            }
        }
    }

    if let Some(branches) = obj.get("allOf").and_then(Value::as_array) {
        for (i, branch) in branches.iter().enumerate() {
            walk(
                branch,
                format!("{pointer}/allOf/{i}"),
                path.clone(),
                array_paths.clone(),
                in_union,
                out,
            );
        }
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Expand a wildcarded data path into concrete indexed paths against one
/// data instance, resolving one array level at a time. An absent or
/// non-array value at any level yields no paths for that branch.
pub fn expand(base_path: &str, data: &Value) -> Vec<String> {
    let mut paths = vec![base_path.to_string()];
    loop {
        let mut next = Vec::new();
        let mut expanded = false;
        for path in &paths {
            let Some(pos) = path.find("[*]") else {
                next.push(path.clone());
                continue;
            };
            expanded = true;
            let prefix = &path[..pos];
            let rest = &path[pos + 3..];
            let value = if prefix.is_empty() {
                Some(data)
            } else {
                data_path::get_path(data, prefix)
            };
            if let Some(Value::Array(items)) = value {
                for i in 0..items.len() {
                    next.push(format!("{prefix}[{i}]{rest}"));
                }
            }
        }
        paths = next;
        if !expanded {
            return paths;
        }
    }
}
