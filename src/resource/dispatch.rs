//! Provisioner dispatch
//!
//! The [`Provisioner`] trait is the seam between the run engine and the
//! cloud APIs: it receives a descriptor whose references have been resolved
//! and returns the identifiers the provider generated.

use super::args::{ResourceKind, Scope};
use super::outputs::ResourceOutputs;
use crate::digitalocean::{CreateDropletRequest, DigitalOceanClient};
use crate::gcp::client::GcpClient;
use crate::gcp::operations::{wait_for_operation, Operation, PollPolicy};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

/// A descriptor ready for submission: no `$ref` / `$concat` markers left
#[derive(Debug, Clone)]
pub struct ResolvedDescriptor {
    pub name: String,
    pub kind: ResourceKind,
    pub args: Value,
}

impl ResolvedDescriptor {
    fn arg_str(&self, key: &str) -> Result<String> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .with_context(|| format!("Missing required argument {} on {}", key, self.name))
    }

    /// Remove a path parameter from the body, returning its value
    fn take_arg(body: &mut Value, key: &str) -> Option<String> {
        body.as_object_mut()
            .and_then(|map| map.remove(key))
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }
}

/// Creates resources and reports their generated identifiers
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Short name for logs and the run summary
    fn name(&self) -> &str;

    async fn create(&self, descriptor: &ResolvedDescriptor) -> Result<ResourceOutputs>;
}

// =============================================================================
// GCP
// =============================================================================

pub struct GcpProvisioner {
    client: GcpClient,
    poll: PollPolicy,
}

impl GcpProvisioner {
    pub fn new(client: GcpClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }

    async fn create_bucket(&self, d: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        let mut body = d.args.clone();
        let project = ResolvedDescriptor::take_arg(&mut body, "project")
            .unwrap_or_else(|| self.client.project_id.clone());

        let url = self.client.storage_buckets_url(&project);
        let response = self.client.post(&url, Some(&body)).await?;
        Ok(ResourceOutputs::from_resource(&response))
    }

    /// Stream the remote asset straight into a media upload
    async fn upload_object(&self, d: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        let bucket = d.arg_str("bucket")?;
        let name = d.arg_str("name")?;
        let source = d
            .args
            .get("source")
            .and_then(|s| s.get("remoteAsset"))
            .and_then(|v| v.as_str())
            .with_context(|| format!("Missing remote asset source on {}", d.name))?;

        // The source URL may carry credentials; only the object name is logged
        tracing::info!(bucket = %bucket, object = %name, "Fetching remote asset");
        let asset = self
            .client
            .http
            .inner()
            .get(source)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| e.without_url())
            .with_context(|| format!("Failed to fetch remote asset for {}", name))?;

        let content_length = asset.content_length();
        let stream = asset.bytes_stream().map(|chunk| chunk.map_err(|e| e.without_url()));
        let body = reqwest::Body::wrap_stream(stream);

        let url = self.client.storage_upload_url(&bucket, &name);
        let response = self
            .client
            .upload(&url, "application/octet-stream", content_length, body)
            .await?;
        Ok(ResourceOutputs::from_resource(&response))
    }

    async fn create_compute(&self, d: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        let (collection, scope) = d
            .kind
            .compute_collection()
            .ok_or_else(|| anyhow!("{} is not a Compute Engine resource", d.kind))?;

        let mut body = d.args.clone();
        let project = ResolvedDescriptor::take_arg(&mut body, "project")
            .unwrap_or_else(|| self.client.project_id.clone());
        let path = match scope {
            Scope::Global => format!("global/{}", collection),
            Scope::Zonal => {
                let zone = ResolvedDescriptor::take_arg(&mut body, "zone")
                    .unwrap_or_else(|| self.client.zone.clone());
                format!("zones/{}/{}", zone, collection)
            }
        };

        // requestId makes a retried insert idempotent on the API side
        let url = format!(
            "{}?requestId={}",
            self.client.compute_project_url(&project, &path),
            uuid::Uuid::new_v4()
        );
        let response = self.client.post(&url, Some(&body)).await?;

        let operation =
            wait_for_operation(&self.client, Operation::from_value(&response)?, self.poll).await?;
        let target = operation
            .target_link
            .as_deref()
            .ok_or_else(|| anyhow!("Operation {} has no targetLink", operation.name))?;

        let resource = self.client.get(&self.client.rebase_compute_link(target)).await?;
        Ok(ResourceOutputs::from_resource(&resource))
    }
}

#[async_trait]
impl Provisioner for GcpProvisioner {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn create(&self, descriptor: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        tracing::debug!("create: kind={}, resource={}", descriptor.kind, descriptor.name);

        match descriptor.kind {
            ResourceKind::Bucket => self.create_bucket(descriptor).await,
            ResourceKind::BucketObject => self.upload_object(descriptor).await,
            ResourceKind::Droplet => Err(anyhow!(
                "{} cannot be created by the GCP provisioner",
                descriptor.kind
            )),
            _ => self.create_compute(descriptor).await,
        }
    }
}

// =============================================================================
// DigitalOcean
// =============================================================================

pub struct DigitalOceanProvisioner {
    client: DigitalOceanClient,
    poll: PollPolicy,
}

impl DigitalOceanProvisioner {
    pub fn new(client: DigitalOceanClient, poll: PollPolicy) -> Self {
        Self { client, poll }
    }
}

#[async_trait]
impl Provisioner for DigitalOceanProvisioner {
    fn name(&self) -> &str {
        "digitalocean"
    }

    async fn create(&self, descriptor: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        if descriptor.kind != ResourceKind::Droplet {
            return Err(anyhow!(
                "{} cannot be created by the DigitalOcean provisioner",
                descriptor.kind
            ));
        }

        let request: CreateDropletRequest = serde_json::from_value(descriptor.args.clone())
            .with_context(|| format!("Invalid droplet arguments on {}", descriptor.name))?;

        let created = self.client.create_droplet(&request).await?;
        let droplet = self.client.wait_active(created.id, self.poll).await?;

        Ok(ResourceOutputs {
            name: Some(droplet.name.clone()),
            self_link: None,
            address: droplet.public_ipv4().map(|s| s.to_string()),
            id: Some(droplet.id.to_string()),
        })
    }
}

// =============================================================================
// Preview
// =============================================================================

/// Creates nothing; reports `<resource.field>` placeholders so a run can be
/// previewed end to end. Literal names are passed through.
#[derive(Debug, Default)]
pub struct PreviewProvisioner;

#[async_trait]
impl Provisioner for PreviewProvisioner {
    fn name(&self) -> &str {
        "preview"
    }

    async fn create(&self, descriptor: &ResolvedDescriptor) -> Result<ResourceOutputs> {
        let placeholder = |field: &str| Some(format!("<{}.{}>", descriptor.name, field));

        Ok(ResourceOutputs {
            name: descriptor
                .args
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or_else(|| placeholder("name")),
            self_link: placeholder("selfLink"),
            address: placeholder("address"),
            id: placeholder("id"),
        })
    }
}
