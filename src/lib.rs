//! Provisioning for a Talos control plane.
//!
//! Two independent profiles:
//! - `cluster`: a GCP bucket holding the Talos release, an ARM64 compute image
//!   built from it, an instance group behind a global TCP load balancer, and a
//!   firewall rule admitting Google's health checks.
//! - `droplet`: a single DigitalOcean droplet.
//!
//! [`resource::builder`] describes the resources, [`engine::apply`] creates
//! them through a [`resource::Provisioner`].

pub mod config;
pub mod digitalocean;
pub mod engine;
pub mod error;
pub mod gcp;
pub mod resource;
