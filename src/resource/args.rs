//! Typed resource arguments
//!
//! One struct per resource kind, serialized with the field names of the
//! provider's REST API so the resolved body can be sent as-is (after the
//! provisioner strips the path parameters such as `project` and `zone`).

use super::input::Input;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Kinds of resources the builder can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    #[serde(rename = "storage#bucket")]
    Bucket,
    #[serde(rename = "storage#object")]
    BucketObject,
    #[serde(rename = "compute#image")]
    Image,
    #[serde(rename = "compute#instanceGroup")]
    InstanceGroup,
    #[serde(rename = "compute#healthCheck")]
    HealthCheck,
    #[serde(rename = "compute#backendService")]
    BackendService,
    #[serde(rename = "compute#targetTcpProxy")]
    TargetTcpProxy,
    #[serde(rename = "compute#globalAddress")]
    GlobalAddress,
    #[serde(rename = "compute#globalForwardingRule")]
    GlobalForwardingRule,
    #[serde(rename = "compute#firewall")]
    Firewall,
    #[serde(rename = "digitalocean#droplet")]
    Droplet,
}

/// Where a compute resource lives in the REST hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Zonal,
}

impl ResourceKind {
    /// Compute Engine collection name and scope, `None` for non-compute kinds
    pub fn compute_collection(self) -> Option<(&'static str, Scope)> {
        let entry = match self {
            ResourceKind::Image => ("images", Scope::Global),
            ResourceKind::InstanceGroup => ("instanceGroups", Scope::Zonal),
            ResourceKind::HealthCheck => ("healthChecks", Scope::Global),
            ResourceKind::BackendService => ("backendServices", Scope::Global),
            ResourceKind::TargetTcpProxy => ("targetTcpProxies", Scope::Global),
            ResourceKind::GlobalAddress => ("addresses", Scope::Global),
            ResourceKind::GlobalForwardingRule => ("forwardingRules", Scope::Global),
            ResourceKind::Firewall => ("firewalls", Scope::Global),
            ResourceKind::Bucket | ResourceKind::BucketObject | ResourceKind::Droplet => {
                return None
            }
        };
        Some(entry)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Bucket => "storage#bucket",
            ResourceKind::BucketObject => "storage#object",
            ResourceKind::Image => "compute#image",
            ResourceKind::InstanceGroup => "compute#instanceGroup",
            ResourceKind::HealthCheck => "compute#healthCheck",
            ResourceKind::BackendService => "compute#backendService",
            ResourceKind::TargetTcpProxy => "compute#targetTcpProxy",
            ResourceKind::GlobalAddress => "compute#globalAddress",
            ResourceKind::GlobalForwardingRule => "compute#globalForwardingRule",
            ResourceKind::Firewall => "compute#firewall",
            ResourceKind::Droplet => "digitalocean#droplet",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Cloud Storage
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketArgs {
    pub name: Input,
    pub location: Input,
    pub project: Input,
}

/// Content of an object
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Asset {
    /// Fetched from a URL at creation time
    RemoteAsset(String),
}

impl Asset {
    pub const REDACTED: &'static str = "[redacted]";

    /// Hide a remote asset URL in an argument body before it is displayed
    pub fn redact(args: &mut Value) {
        if let Some(source) = args.pointer_mut("/source/remoteAsset") {
            *source = Value::String(Self::REDACTED.to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketObjectArgs {
    pub bucket: Input,
    pub name: Input,
    pub source: Asset,
}

// =============================================================================
// Compute Engine
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Architecture {
    Arm64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuestOsFeatureType {
    VirtioScsiMultiqueue,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuestOsFeature {
    #[serde(rename = "type")]
    pub feature_type: GuestOsFeatureType,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawDisk {
    pub source: Input,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArgs {
    pub name: Input,
    pub project: Input,
    pub architecture: Architecture,
    pub guest_os_features: Vec<GuestOsFeature>,
    pub raw_disk: RawDisk,
    pub storage_locations: Vec<Input>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupArgs {
    pub name: Input,
    pub project: Input,
    pub zone: Input,
    pub named_ports: Vec<NamedPort>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    Tcp,
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpHealthCheck {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckArgs {
    pub name: Input,
    pub project: Input,
    #[serde(rename = "type")]
    pub check_type: Protocol,
    pub tcp_health_check: TcpHealthCheck,
}

#[derive(Debug, Clone, Serialize)]
pub struct Backend {
    pub group: Input,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendServiceArgs {
    pub name: Input,
    pub project: Input,
    pub backends: Vec<Backend>,
    pub health_checks: Vec<Input>,
    pub port_name: String,
    pub protocol: Protocol,
    pub timeout_sec: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyHeader {
    None,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetTcpProxyArgs {
    pub name: Input,
    pub project: Input,
    pub proxy_header: ProxyHeader,
    pub service: Input,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalAddressArgs {
    pub name: Input,
    pub project: Input,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalForwardingRuleArgs {
    pub name: Input,
    pub project: Input,
    #[serde(rename = "IPAddress")]
    pub ip_address: Input,
    pub port_range: String,
    pub target: Input,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallArgs {
    pub name: Input,
    pub project: Input,
    pub allowed: Vec<FirewallAllowed>,
    pub source_ranges: Vec<String>,
    pub target_tags: Vec<Input>,
}

// =============================================================================
// DigitalOcean
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DropletArgs {
    pub name: Input,
    pub image: String,
    pub region: String,
    pub size: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}
