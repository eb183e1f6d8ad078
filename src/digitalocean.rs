//! DigitalOcean API client
//!
//! Only what the droplet profile needs: create a droplet and wait for it
//! to become active.
//!
//! API Documentation: <https://docs.digitalocean.com/reference/api/>

use crate::config::Secret;
use crate::gcp::http::sanitize_for_log;
use crate::gcp::operations::PollPolicy;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Base URL for the DigitalOcean API
pub const API_BASE_URL: &str = "https://api.digitalocean.com/v2";

/// Droplet from the API
#[derive(Debug, Clone, Deserialize)]
pub struct Droplet {
    pub id: i64,
    pub name: String,
    /// "new", "active", "off" or "archive"
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
}

impl Droplet {
    pub fn public_ipv4(&self) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|ip| ip.address_type == "public")
            .map(|ip| ip.ip_address.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkAddress {
    pub ip_address: String,
    /// "public" or "private"
    #[serde(rename = "type")]
    pub address_type: String,
}

/// Error body, e.g. `{"id": "unauthorized", "message": "..."}`
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DropletResponse {
    droplet: Droplet,
}

/// Request body for creating a droplet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}

#[derive(Clone)]
pub struct DigitalOceanClient {
    client: Client,
    api_token: Secret,
    base_url: String,
}

impl DigitalOceanClient {
    pub fn new(api_token: Secret) -> Result<Self> {
        Self::with_base_url(api_token, API_BASE_URL)
    }

    pub fn with_base_url(api_token: Secret, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("talos-infra/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<Droplet> {
        info!(
            name = %request.name,
            region = %request.region,
            size = %request.size,
            "Creating droplet"
        );

        let url = format!("{}/droplets", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_token.expose())
            .json(request)
            .send()
            .await
            .context("Failed to send request")?;

        let droplet = Self::handle_response(response).await?.droplet;
        info!(droplet_id = droplet.id, "Droplet created");
        Ok(droplet)
    }

    pub async fn get_droplet(&self, id: i64) -> Result<Droplet> {
        let url = format!("{}/droplets/{}", self.base_url, id);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_token.expose())
            .send()
            .await
            .context("Failed to send request")?;

        Ok(Self::handle_response(response).await?.droplet)
    }

    /// Poll until the droplet is active
    pub async fn wait_active(&self, id: i64, policy: PollPolicy) -> Result<Droplet> {
        let start = Instant::now();

        loop {
            let droplet = self.get_droplet(id).await?;
            debug!(
                droplet_id = id,
                status = %droplet.status,
                elapsed_secs = start.elapsed().as_secs(),
                "Polling droplet status"
            );

            if droplet.status == "active" {
                return Ok(droplet);
            }
            if start.elapsed() > policy.timeout {
                return Err(anyhow!(
                    "Droplet {} not active after {} seconds",
                    id,
                    policy.timeout.as_secs()
                ));
            }

            tokio::time::sleep(policy.interval).await;
        }
    }

    async fn handle_response(response: reqwest::Response) -> Result<DropletResponse> {
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|e| format!(" ({})", e.message))
                .unwrap_or_default();
            return Err(anyhow!("API request failed: {}{}", status, message));
        }

        serde_json::from_str(&text).context("Failed to parse droplet response")
    }
}
