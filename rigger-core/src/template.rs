//! Output references inside JSON payloads.
//!
//! A string value may contain `${step.path}` placeholders. `path` is one of
//! `id`, `name`, `kind`, `created_at`, `properties` or `properties.<a.b.c>`.
//! A string consisting of exactly one placeholder is replaced by the referenced
//! JSON value; placeholders inside longer strings are interpolated as text.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::error::StepError;
use crate::handle::ResourceHandle;

/// A parsed `${step.path}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub step: String,
    pub path: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.step, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed reference '{0}'")]
pub struct MalformedReference(pub String);

enum Segment<'a> {
    Text(&'a str),
    Ref(Reference),
}

fn parse_reference(inner: &str) -> Option<Reference> {
    let (step, path) = inner.split_once('.')?;
    if step.is_empty() || path.is_empty() {
        return None;
    }
    Some(Reference {
        step: step.to_string(),
        path: path.to_string(),
    })
}

fn scan(s: &str) -> Result<Vec<Segment<'_>>, MalformedReference> {
    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| MalformedReference(rest[start..].to_string()))?;
        let reference = parse_reference(&after[..end])
            .ok_or_else(|| MalformedReference(rest[start..start + end + 3].to_string()))?;
        segments.push(Segment::Ref(reference));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Collect every reference in `value`.
pub fn references(value: &Value) -> Result<Vec<Reference>, MalformedReference> {
    let mut found = Vec::new();
    collect(value, &mut found)?;
    Ok(found)
}

fn collect(value: &Value, found: &mut Vec<Reference>) -> Result<(), MalformedReference> {
    match value {
        Value::String(s) => {
            for segment in scan(s)? {
                if let Segment::Ref(r) = segment {
                    found.push(r);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect(item, found)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replace every reference in `value` using `lookup`.
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Value, StepError>
where
    F: Fn(&Reference) -> Result<Value, StepError>,
{
    match value {
        Value::String(s) => {
            let segments =
                scan(s).map_err(|e| StepError::UnresolvedReference { reference: e.0 })?;
            match segments.as_slice() {
                [Segment::Ref(r)] => lookup(r),
                _ => {
                    let mut out = String::with_capacity(s.len());
                    for segment in &segments {
                        match segment {
                            Segment::Text(t) => out.push_str(t),
                            Segment::Ref(r) => match lookup(r)? {
                                Value::String(v) => out.push_str(&v),
                                other => out.push_str(&other.to_string()),
                            },
                        }
                    }
                    Ok(Value::String(out))
                }
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), resolve(item, lookup)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Read `path` from a recorded handle.
pub fn handle_field(handle: &ResourceHandle, path: &str) -> Option<Value> {
    match path {
        "id" => Some(Value::String(handle.id.to_string())),
        "name" => Some(Value::String(handle.name.clone())),
        "kind" => Some(Value::String(handle.kind.to_string())),
        "created_at" => Some(Value::String(handle.created_at.to_rfc3339())),
        "properties" => Some(handle.properties.clone()),
        _ => path
            .strip_prefix("properties.")
            .and_then(|p| handle.property(p))
            .cloned(),
    }
}
