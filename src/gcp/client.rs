//! GCP Client
//!
//! Combines credentials and HTTP plumbing with the URL builders for the
//! Compute Engine and Cloud Storage APIs.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use reqwest::Body;
use serde_json::Value;

/// API roots; overridable so tests can point the client at a mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compute: String,
    pub storage: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: "https://compute.googleapis.com".to_string(),
            storage: "https://storage.googleapis.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Both APIs served from one base URL
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compute: base.to_string(),
            storage: base.to_string(),
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub project_id: String,
    pub zone: String,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a client authenticated through Application Default Credentials
    pub async fn new(project_id: &str, zone: &str, endpoints: Endpoints) -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(credentials, project_id, zone, endpoints)
    }

    pub fn with_credentials(
        credentials: GcpCredentials,
        project_id: &str,
        zone: &str,
        endpoints: Endpoints,
    ) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new()?,
            project_id: project_id.to_string(),
            zone: zone.to_string(),
            endpoints,
        })
    }

    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    pub async fn upload(
        &self,
        url: &str,
        content_type: &str,
        content_length: Option<u64>,
        body: Body,
    ) -> Result<Value> {
        let token = self.get_token().await?;
        self.http
            .post_body(url, &token, content_type, content_length, body)
            .await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL for an explicit project
    pub fn compute_project_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/{}",
            self.endpoints.compute, project, path
        )
    }

    /// Rewrite a link returned by the API (always rooted at the public
    /// endpoint) onto the configured compute endpoint
    pub fn rebase_compute_link(&self, link: &str) -> String {
        const PUBLIC_ROOTS: &[&str] = &[
            "https://compute.googleapis.com",
            "https://www.googleapis.com",
        ];
        for root in PUBLIC_ROOTS {
            if let Some(rest) = link.strip_prefix(root) {
                return format!("{}{}", self.endpoints.compute, rest);
            }
        }
        link.to_string()
    }

    // =========================================================================
    // Cloud Storage API helpers
    // =========================================================================

    /// Build Cloud Storage API URL
    pub fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.endpoints.storage, path)
    }

    /// Bucket insert URL (`POST b?project=`)
    pub fn storage_buckets_url(&self, project: &str) -> String {
        format!(
            "{}?project={}",
            self.storage_url("b"),
            urlencoding::encode(project)
        )
    }

    /// Simple media upload URL for an object
    pub fn storage_upload_url(&self, bucket: &str, object: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoints.storage,
            urlencoding::encode(bucket),
            urlencoding::encode(object)
        )
    }
}
