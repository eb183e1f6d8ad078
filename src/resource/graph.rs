//! Resource graph
//!
//! An ordered list of descriptors. A descriptor may only depend on
//! descriptors declared before it, so declaration order is always a valid
//! creation order and the graph cannot contain cycles.

use super::args::ResourceKind;
use super::input::{collect_refs, OutputField};
use crate::error::GraphError;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A named output surfaced at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub name: String,
    pub field: OutputField,
}

/// A declarative request to create one resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Logical name, unique within a graph
    pub name: String,
    pub kind: ResourceKind,
    /// Argument body; may contain `$ref` / `$concat` markers
    pub args: Value,
    /// Ordering edges that are not visible as references in `args`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,
}

impl Descriptor {
    pub fn new<A: Serialize>(
        name: &str,
        kind: ResourceKind,
        args: &A,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: name.to_string(),
            kind,
            args: serde_json::to_value(args)?,
            depends_on: Vec::new(),
            exports: Vec::new(),
        })
    }

    pub fn depends_on(mut self, resource: &str) -> Self {
        self.depends_on.push(resource.to_string());
        self
    }

    pub fn export(mut self, name: &str, field: OutputField) -> Self {
        self.exports.push(Export {
            name: name.to_string(),
            field,
        });
        self
    }

    /// Referenced resources followed by explicit dependencies, deduplicated
    pub fn dependencies(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        collect_refs(&self.args)
            .into_iter()
            .map(|r| r.resource)
            .chain(self.depends_on.iter().cloned())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceGraph {
    pub descriptors: Vec<Descriptor>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: Descriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Check names are unique and every dependency is declared earlier
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut position: HashMap<&str, usize> = HashMap::new();
        for (i, d) in self.descriptors.iter().enumerate() {
            if position.insert(d.name.as_str(), i).is_some() {
                return Err(GraphError::DuplicateName(d.name.clone()));
            }
        }

        for (i, d) in self.descriptors.iter().enumerate() {
            for dependency in d.dependencies() {
                match position.get(dependency.as_str()) {
                    None => {
                        return Err(GraphError::UnknownDependency {
                            resource: d.name.clone(),
                            dependency,
                        })
                    }
                    Some(&j) if j >= i => {
                        return Err(GraphError::ForwardDependency {
                            resource: d.name.clone(),
                            dependency,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }

    /// Group descriptors into levels: a descriptor's level is one more than
    /// the deepest of its dependencies. Declaration order is kept within a level.
    pub fn levels(&self) -> Result<Vec<Vec<&Descriptor>>, GraphError> {
        self.validate()?;

        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<&Descriptor>> = Vec::new();

        for d in &self.descriptors {
            let level = d
                .dependencies()
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);

            depth.insert(d.name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(d);
        }

        Ok(levels)
    }
}
