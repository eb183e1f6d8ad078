//! Generated identifiers and the export table

use super::input::{OutputField, OutputRef};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Identifiers a provider generated for one created resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ResourceOutputs {
    pub fn get(&self, field: OutputField) -> Option<&str> {
        match field {
            OutputField::Name => self.name.as_deref(),
            OutputField::SelfLink => self.self_link.as_deref(),
            OutputField::Address => self.address.as_deref(),
            OutputField::Id => self.id.as_deref(),
        }
    }

    /// Read the identifiers out of an API resource body.
    /// Numeric ids (Compute Engine, DigitalOcean) are stringified.
    pub fn from_resource(value: &Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            name: text("name"),
            self_link: text("selfLink"),
            address: text("address"),
            id: text("id"),
        }
    }
}

/// Export name → identifier, in the order the exports were registered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportTable {
    entries: Vec<(String, String)>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an export; re-registering a name replaces its value in place
    pub fn insert(&mut self, name: &str, value: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a previously written export file (a flat JSON object)
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let mut table = Self::new();
        for (name, v) in map {
            table.insert(name, v.as_str()?.to_string());
        }
        Some(table)
    }
}

impl Serialize for ExportTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Outputs of every resource created so far in a run
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    by_resource: HashMap<String, ResourceOutputs>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, resource: &str, outputs: ResourceOutputs) {
        self.by_resource.insert(resource.to_string(), outputs);
    }

    pub fn resource(&self, resource: &str) -> Option<&ResourceOutputs> {
        self.by_resource.get(resource)
    }

    pub fn lookup(&self, r: &OutputRef) -> Option<String> {
        self.by_resource
            .get(&r.resource)
            .and_then(|o| o.get(r.field))
            .map(|s| s.to_string())
    }
}
