//! Compute Engine long-running operations
//!
//! Every Compute Engine insert returns an `Operation`. The resource only
//! exists (and only has its generated fields) once the operation is `DONE`.

use super::client::GcpClient;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub target_link: Option<String>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorItem {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).context("Response is not a compute operation")
    }

    pub fn is_done(&self) -> bool {
        self.status == "DONE"
    }

    /// Turn a finished operation carrying errors into an `Err`
    pub fn check(&self) -> Result<()> {
        match &self.error {
            Some(error) if !error.errors.is_empty() => {
                let messages: Vec<String> = error
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .collect();
                Err(anyhow!("Operation {} failed: {}", self.name, messages.join("; ")))
            }
            _ => Ok(()),
        }
    }
}

/// How long and how often to poll
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Poll an operation until it is `DONE`, then surface its error if any
pub async fn wait_for_operation(
    client: &GcpClient,
    operation: Operation,
    policy: PollPolicy,
) -> Result<Operation> {
    let start = Instant::now();
    let mut current = operation;

    loop {
        if current.is_done() {
            current.check()?;
            tracing::debug!(
                operation = %current.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Operation done"
            );
            return Ok(current);
        }

        if start.elapsed() > policy.timeout {
            return Err(anyhow!(
                "Operation {} did not finish within {} seconds",
                current.name,
                policy.timeout.as_secs()
            ));
        }

        let Some(link) = current.self_link.as_deref() else {
            return Err(anyhow!("Operation {} has no selfLink to poll", current.name));
        };

        tokio::time::sleep(policy.interval).await;

        let url = client.rebase_compute_link(link);
        let response = client
            .get(&url)
            .await
            .with_context(|| format!("Failed to poll operation {}", current.name))?;
        current = Operation::from_value(&response)?;

        tracing::trace!(operation = %current.name, status = %current.status, "Polled operation");
    }
}
