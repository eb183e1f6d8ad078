//! Configuration Management
//!
//! Loads the stack file (YAML, namespaced `namespace:key` entries), applies
//! command-line and environment overrides, and produces the immutable
//! configuration for one provisioning run.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Namespace for the project's own keys (`talos-infra:data`, ...)
pub const PROJECT_NAMESPACE: &str = "talos-infra";

/// Namespace for the GCP provider keys (`google-native:project`, ...)
pub const GCP_NAMESPACE: &str = "google-native";

/// Namespace for the DigitalOcean provider keys
pub const DIGITALOCEAN_NAMESPACE: &str = "digitalocean";

/// Stack file looked up in the working directory when `--stack` is not given
pub const DEFAULT_STACK_FILE: &str = "talos-infra.yaml";

/// A configuration value that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Naming and numeric constants shared by every descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bucket_name: String,
    pub image_name: String,
    pub port: u16,
    pub timeout_sec: u32,
    pub forwarding_port_range: String,
    /// Source ranges used by Google's health checks
    pub health_check_ranges: Vec<String>,
    pub droplet_image: String,
    pub droplet_region: String,
    pub droplet_size: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket_name: "nhwk".to_string(),
            image_name: "talos".to_string(),
            port: 6443,
            timeout_sec: 300,
            forwarding_port_range: "443".to_string(),
            health_check_ranges: vec!["130.211.0.0/22".to_string(), "35.191.0.0/16".to_string()],
            droplet_image: "ubuntu-22-04-x64".to_string(),
            droplet_region: "nyc3".to_string(),
            droplet_size: "s-1vcpu-1gb".to_string(),
        }
    }
}

impl Settings {
    /// `{image_name}-{suffix}`, the naming scheme for every resource
    pub fn named(&self, suffix: &str) -> String {
        format!("{}-{}", self.image_name, suffix)
    }

    /// Name of the instance group port mapping, e.g. `tcp6443`
    pub fn named_port(&self) -> String {
        format!("tcp{}", self.port)
    }
}

/// Release artifact the compute image is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// May embed a signed query or token
    pub url: Secret,
    /// Last path segment of the URL, used as the object file name
    pub file: String,
}

impl Release {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRelease {
            reason: reason.to_string(),
        };

        let parsed = url::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("only http and https URLs can be fetched"));
        }

        let file = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| invalid("URL has no file name"))?;

        Ok(Self {
            url: Secret::new(url),
            file: file.to_string(),
        })
    }
}

/// Structured `data` object in the stack file
#[derive(Debug, Clone, Deserialize)]
struct Data {
    release: String,
}

/// Raw stack file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StackFile {
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

impl StackFile {
    /// Load a stack file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stack file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse stack file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Look up `namespace:key`; keys of the project namespace may also be written bare.
    fn lookup(&self, namespace: &str, key: &str) -> Option<&serde_yaml::Value> {
        self.config.get(&format!("{}:{}", namespace, key)).or_else(|| {
            if namespace == PROJECT_NAMESPACE {
                self.config.get(key)
            } else {
                None
            }
        })
    }

    /// Read a plaintext string value
    pub fn string(&self, namespace: &str, key: &str) -> Result<Option<String>, ConfigError> {
        let full_key = format!("{}:{}", namespace, key);
        let Some(value) = self.lookup(namespace, key) else {
            return Ok(None);
        };

        if is_encrypted(value) {
            return Err(ConfigError::Encrypted(full_key));
        }

        match value {
            serde_yaml::Value::String(s) => Ok(Some(s.clone())),
            serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
            serde_yaml::Value::Null => Ok(None),
            _ => Err(ConfigError::Invalid {
                key: full_key,
                reason: "expected a string".to_string(),
            }),
        }
    }

    /// Read a list of strings; a missing key is an empty list
    pub fn strings(&self, namespace: &str, key: &str) -> Result<Vec<String>, ConfigError> {
        let full_key = format!("{}:{}", namespace, key);
        let Some(value) = self.lookup(namespace, key) else {
            return Ok(Vec::new());
        };

        if is_encrypted(value) {
            return Err(ConfigError::Encrypted(full_key));
        }

        serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Invalid {
            key: full_key,
            reason: e.to_string(),
        })
    }

    /// Release URL from `data.release`, falling back to the flat `talos-release` key
    fn release_url(&self) -> Result<Option<String>, ConfigError> {
        if let Some(value) = self.lookup(PROJECT_NAMESPACE, "data") {
            if is_encrypted(value) {
                return Err(ConfigError::Encrypted(format!("{}:data", PROJECT_NAMESPACE)));
            }
            let data: Data =
                serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Invalid {
                    key: format!("{}:data", PROJECT_NAMESPACE),
                    reason: e.to_string(),
                })?;
            return Ok(Some(data.release));
        }

        self.string(PROJECT_NAMESPACE, "talos-release")
    }
}

/// Pulumi-style `{secure: <ciphertext>}` values
fn is_encrypted(value: &serde_yaml::Value) -> bool {
    value
        .as_mapping()
        .map(|m| m.contains_key("secure"))
        .unwrap_or(false)
}

/// Values supplied on the command line or through the environment.
/// They take precedence over the stack file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub release: Option<String>,
    pub digitalocean_token: Option<String>,
    pub ssh_keys: Vec<String>,
}

fn require(
    overridden: &Option<String>,
    stack: &StackFile,
    namespace: &str,
    key: &str,
) -> Result<String, ConfigError> {
    if let Some(value) = overridden.as_ref().filter(|v| !v.is_empty()) {
        return Ok(value.clone());
    }
    stack
        .string(namespace, key)?
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(format!("{}:{}", namespace, key)))
}

/// Everything the cluster profile needs
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub project: Secret,
    pub region: Secret,
    pub zone: Secret,
    pub release: Release,
}

impl ClusterConfig {
    /// Merge overrides over the stack file; every value is required.
    pub fn resolve(stack: &StackFile, overrides: &Overrides) -> Result<Self, ConfigError> {
        let project = require(&overrides.project, stack, GCP_NAMESPACE, "project")?;
        let region = require(&overrides.region, stack, GCP_NAMESPACE, "region")?;
        let zone = require(&overrides.zone, stack, GCP_NAMESPACE, "zone")?;

        let release_url = match overrides.release.as_ref().filter(|v| !v.is_empty()) {
            Some(url) => url.clone(),
            None => stack
                .release_url()?
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    ConfigError::Missing(format!("{}:data.release", PROJECT_NAMESPACE))
                })?,
        };

        Ok(Self {
            project: Secret::new(project),
            region: Secret::new(region),
            zone: Secret::new(zone),
            release: Release::parse(&release_url)?,
        })
    }
}

/// Everything the droplet profile needs
#[derive(Debug, Clone)]
pub struct DropletConfig {
    pub token: Secret,
    pub ssh_keys: Vec<String>,
}

impl DropletConfig {
    pub fn resolve(stack: &StackFile, overrides: &Overrides) -> Result<Self, ConfigError> {
        let token = require(&overrides.digitalocean_token, stack, DIGITALOCEAN_NAMESPACE, "token")?;

        let ssh_keys = if overrides.ssh_keys.is_empty() {
            stack.strings(PROJECT_NAMESPACE, "sshKeys")?
        } else {
            overrides.ssh_keys.clone()
        };

        Ok(Self {
            token: Secret::new(token),
            ssh_keys,
        })
    }
}

/// Stack file path (CLI > working directory > user config directory)
pub fn stack_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(DEFAULT_STACK_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|p| p.join("talos-infra").join("stack.yaml"))
        .filter(|p| p.exists())
}
