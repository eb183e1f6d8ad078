//! GCP API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens from Application Default Credentials
//! - [`client`] - Main GCP client and API URL builders
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operations`] - Waiting on Compute Engine long-running operations
//!
//! # Example
//!
//! ```ignore
//! use talos_infra::gcp::client::{Endpoints, GcpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new("my-project", "europe-west4-a", Endpoints::default()).await?;
//!     let url = client.compute_project_url("my-project", "global/images/talos");
//!     let image = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operations;
