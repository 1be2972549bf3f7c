//! Dotted data-path access into JSON values.
//!
//! Paths use dot-separated keys with numeric segments addressing array
//! elements: `images.0.url` or `images[0].url` both resolve the same
//! element. Lookups fail soft (`None`) — callers decide whether a
//! missing path is an error.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a dotted path into segments. Bracketed indices are accepted.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in path.trim().chars() {
        match ch {
            '.' if !in_brackets => {
                push_segment(&mut segments, &current);
                current.clear();
            }
            '[' => {
                push_segment(&mut segments, &current);
                current.clear();
                in_brackets = true;
            }
            ']' => {
                push_segment(&mut segments, &current);
                current.clear();
                in_brackets = false;
            }
            _ => current.push(ch),
        }
    }
    push_segment(&mut segments, &current);
    segments
}

fn push_segment(segments: &mut Vec<PathSegment>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    match trimmed.parse::<usize>() {
        Ok(index) => segments.push(PathSegment::Index(index)),
        Err(_) => segments.push(PathSegment::Key(trimmed.to_string())),
    }
}

/// Resolve a path against a value.
pub fn get_path<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = target;
    for segment in parse_path(path) {
        current = match segment {
            PathSegment::Key(key) => current.get(&key)?,
            PathSegment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

/// Replace the value at a path, returning `false` when any parent is
/// missing. Never creates intermediate structure.
pub fn set_path(target: &mut Value, path: &str, value: Value) -> bool {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = target;
    for segment in parents {
        let next = match segment {
            PathSegment::Key(key) => current.get_mut(key),
            PathSegment::Index(index) => current.as_array_mut().and_then(|a| a.get_mut(*index)),
        };
        match next {
            Some(v) => current = v,
            None => return false,
        }
    }

    match last {
        PathSegment::Key(key) => match current.as_object_mut() {
            Some(map) => {
                map.insert(key.clone(), value);
                true
            }
            None => false,
        },
        PathSegment::Index(index) => match current.as_array_mut() {
            Some(arr) if *index < arr.len() => {
                arr[*index] = value;
                true
            }
            _ => false,
        },
    }
}

/// Remove the value at a path, fail-soft.
pub fn remove_path(target: &mut Value, path: &str) {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let next = match segment {
            PathSegment::Key(key) => current.get_mut(key),
            PathSegment::Index(index) => current.as_array_mut().and_then(|a| a.get_mut(*index)),
        };
        match next {
            Some(v) => current = v,
            None => return,
        }
    }

    match last {
        PathSegment::Key(key) => {
            if let Some(map) = current.as_object_mut() {
                map.remove(key);
            }
        }
        PathSegment::Index(index) => {
            if let Some(arr) = current.as_array_mut() {
                if *index < arr.len() {
                    arr.remove(*index);
                }
            }
        }
    }
}
