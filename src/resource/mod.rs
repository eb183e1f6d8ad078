//! Resource description layer
//!
//! Descriptors are built from typed argument structs, wired together through
//! output references, and handed to a [`Provisioner`] in dependency order.
//!
//! # Architecture
//!
//! - [`input`] - Literal and referenced argument values
//! - [`args`] - Typed arguments per resource kind
//! - [`graph`] - Descriptors, dependency validation and levels
//! - [`builder`] - The cluster and droplet graphs
//! - [`outputs`] - Generated identifiers and the export table
//! - [`dispatch`] - The provisioner interface and its implementations
//!
//! # Example
//!
//! ```ignore
//! use talos_infra::config::Settings;
//! use talos_infra::resource::builder::cluster_graph;
//!
//! fn preview(config: &talos_infra::config::ClusterConfig) -> anyhow::Result<()> {
//!     let graph = cluster_graph(&Settings::default(), config)?;
//!     for level in graph.levels()? {
//!         println!("{:?}", level.iter().map(|d| &d.name).collect::<Vec<_>>());
//!     }
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod builder;
pub mod dispatch;
pub mod graph;
pub mod input;
pub mod outputs;

pub use dispatch::{Provisioner, ResolvedDescriptor};
pub use graph::{Descriptor, ResourceGraph};
pub use outputs::{ExportTable, Outputs, ResourceOutputs};
