//! Descriptor inputs
//!
//! A descriptor argument is either known up front (a literal) or produced by
//! another descriptor once it has been created. References are encoded into
//! the JSON argument body as `{"$ref": "bucket.name"}` and
//! `{"$concat": [...]}` so the body can be inspected, printed and resolved
//! generically.

use crate::error::GraphError;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const REF_KEY: &str = "$ref";
pub const CONCAT_KEY: &str = "$concat";

/// Identifier a created resource exposes to its dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputField {
    Name,
    SelfLink,
    Address,
    Id,
}

impl OutputField {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputField::Name => "name",
            OutputField::SelfLink => "selfLink",
            OutputField::Address => "address",
            OutputField::Id => "id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(OutputField::Name),
            "selfLink" => Some(OutputField::SelfLink),
            "address" => Some(OutputField::Address),
            "id" => Some(OutputField::Id),
            _ => None,
        }
    }
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OutputField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `resource.field`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub resource: String,
    pub field: OutputField,
}

impl OutputRef {
    pub fn new(resource: &str, field: OutputField) -> Self {
        Self {
            resource: resource.to_string(),
            field,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (resource, field) = s.rsplit_once('.')?;
        if resource.is_empty() {
            return None;
        }
        Some(Self {
            resource: resource.to_string(),
            field: OutputField::parse(field)?,
        })
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.field)
    }
}

/// A descriptor argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Literal(String),
    Output(OutputRef),
    Concat(Vec<Input>),
}

impl Input {
    pub fn literal(value: impl Into<String>) -> Self {
        Input::Literal(value.into())
    }

    pub fn output(resource: &str, field: OutputField) -> Self {
        Input::Output(OutputRef::new(resource, field))
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(value)
    }
}

impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Input::Literal(s) => serializer.serialize_str(s),
            Input::Output(r) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(REF_KEY, &r.to_string())?;
                map.end()
            }
            Input::Concat(parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(CONCAT_KEY, parts)?;
                map.end()
            }
        }
    }
}

/// Read a `{"$ref": ...}` marker
fn as_ref_marker(value: &Value) -> Option<OutputRef> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(REF_KEY).and_then(|v| v.as_str()).and_then(OutputRef::parse)
}

/// Read a `{"$concat": [...]}` marker
fn as_concat_marker(value: &Value) -> Option<&Vec<Value>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(CONCAT_KEY).and_then(|v| v.as_array())
}

/// Every output reference inside an argument body, in document order
pub fn collect_refs(value: &Value) -> Vec<OutputRef> {
    let mut refs = Vec::new();
    walk_refs(value, &mut refs);
    refs
}

fn walk_refs(value: &Value, refs: &mut Vec<OutputRef>) {
    if let Some(r) = as_ref_marker(value) {
        refs.push(r);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| walk_refs(v, refs)),
        Value::Object(map) => map.values().for_each(|v| walk_refs(v, refs)),
        _ => {}
    }
}

/// Replace every reference marker with the value `lookup` yields for it
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Value, GraphError>
where
    F: Fn(&OutputRef) -> Option<String>,
{
    if let Some(r) = as_ref_marker(value) {
        return lookup(&r)
            .map(Value::String)
            .ok_or_else(|| GraphError::UnresolvedOutput {
                resource: r.resource.clone(),
                field: r.field.to_string(),
            });
    }

    if let Some(parts) = as_concat_marker(value) {
        let mut joined = String::new();
        for part in parts {
            match resolve(part, lookup)? {
                Value::String(s) => joined.push_str(&s),
                other => joined.push_str(&other.to_string()),
            }
        }
        return Ok(Value::String(joined));
    }

    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| resolve(v, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                resolved.insert(key.clone(), resolve(v, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Render references as `${bucket.name}` placeholders, for previews
pub fn render_placeholders(value: &Value) -> Value {
    resolve(value, &|r: &OutputRef| Some(format!("${{{}}}", r)))
        .unwrap_or_else(|_| value.clone())
}
