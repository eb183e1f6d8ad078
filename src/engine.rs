//! Run engine
//!
//! Walks a validated resource graph, resolves each descriptor's references
//! from the outputs of resources created earlier in the run, submits it to
//! a [`Provisioner`] and records outputs and exports. The first failure
//! aborts the run; nothing already created is rolled back.

use crate::resource::input::{resolve, OutputRef};
use crate::resource::{
    Descriptor, ExportTable, Outputs, Provisioner, ResolvedDescriptor, ResourceGraph,
    ResourceOutputs,
};
use crate::error::GraphError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Submit descriptors of the same dependency level concurrently
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResource {
    pub name: String,
    pub kind: String,
    pub outputs: ResourceOutputs,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub provisioner: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resources: Vec<CreatedResource>,
    pub exports: ExportTable,
}

/// Replace a descriptor's references with outputs recorded so far
pub fn resolve_descriptor(
    descriptor: &Descriptor,
    outputs: &Outputs,
) -> Result<ResolvedDescriptor> {
    let args = resolve(&descriptor.args, &|r: &OutputRef| outputs.lookup(r))
        .with_context(|| format!("Failed to resolve inputs of {}", descriptor.name))?;

    Ok(ResolvedDescriptor {
        name: descriptor.name.clone(),
        kind: descriptor.kind,
        args,
    })
}

async fn submit(
    provisioner: &dyn Provisioner,
    resolved: &ResolvedDescriptor,
) -> Result<ResourceOutputs> {
    tracing::info!(resource = %resolved.name, kind = %resolved.kind, "Creating resource");

    let outputs = provisioner
        .create(resolved)
        .await
        .with_context(|| format!("Failed to create {} ({})", resolved.name, resolved.kind))?;

    tracing::info!(
        resource = %resolved.name,
        self_link = outputs.self_link.as_deref().unwrap_or("-"),
        "Created resource"
    );
    Ok(outputs)
}

struct RunState {
    outputs: Outputs,
}

impl RunState {
    /// Store a created resource's outputs, checking its exports can be served
    fn record(&mut self, descriptor: &Descriptor, created: ResourceOutputs) -> Result<()> {
        for export in &descriptor.exports {
            if created.get(export.field).is_none() {
                return Err(GraphError::UnresolvedOutput {
                    resource: descriptor.name.clone(),
                    field: export.field.to_string(),
                }
                .into());
            }
        }
        self.outputs.record(&descriptor.name, created);
        Ok(())
    }

    /// Resources and exports in declaration order, whatever order they were created in
    fn finish(self, graph: &ResourceGraph) -> (Vec<CreatedResource>, ExportTable) {
        let mut resources = Vec::with_capacity(graph.len());
        let mut exports = ExportTable::new();

        for descriptor in &graph.descriptors {
            let Some(created) = self.outputs.resource(&descriptor.name) else {
                continue;
            };
            for export in &descriptor.exports {
                if let Some(value) = created.get(export.field) {
                    tracing::debug!(export = %export.name, value = %value, "Export registered");
                    exports.insert(&export.name, value.to_string());
                }
            }
            resources.push(CreatedResource {
                name: descriptor.name.clone(),
                kind: descriptor.kind.to_string(),
                outputs: created.clone(),
            });
        }

        (resources, exports)
    }
}

/// Create every resource of the graph
pub async fn apply(
    graph: &ResourceGraph,
    provisioner: &dyn Provisioner,
    options: ApplyOptions,
) -> Result<RunSummary> {
    let started_at = Utc::now();
    let levels = graph.levels()?;

    tracing::info!(
        provisioner = provisioner.name(),
        resources = graph.len(),
        levels = levels.len(),
        parallel = options.parallel,
        "Starting run"
    );

    let mut state = RunState {
        outputs: Outputs::new(),
    };

    if options.parallel {
        for (index, level) in levels.iter().enumerate() {
            let resolved = level
                .iter()
                .map(|d| resolve_descriptor(d, &state.outputs))
                .collect::<Result<Vec<_>>>()?;

            tracing::debug!(level = index, size = resolved.len(), "Submitting level");
            let created = try_join_all(resolved.iter().map(|r| submit(provisioner, r))).await?;

            for (descriptor, outputs) in level.iter().zip(created) {
                state.record(descriptor, outputs)?;
            }
        }
    } else {
        for descriptor in &graph.descriptors {
            let resolved = resolve_descriptor(descriptor, &state.outputs)?;
            let created = submit(provisioner, &resolved).await?;
            state.record(descriptor, created)?;
        }
    }

    let (resources, exports) = state.finish(graph);
    let finished_at = Utc::now();
    tracing::info!(
        exports = exports.len(),
        elapsed_ms = (finished_at - started_at).num_milliseconds(),
        "Run complete"
    );

    Ok(RunSummary {
        provisioner: provisioner.name().to_string(),
        started_at,
        finished_at,
        resources,
        exports,
    })
}
