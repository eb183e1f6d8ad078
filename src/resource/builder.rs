//! Resource Graph Builder
//!
//! Turns configuration into the fixed descriptor graphs of the two
//! provisioning profiles.

use super::args::*;
use super::graph::{Descriptor, ResourceGraph};
use super::input::{Input, OutputField};
use crate::config::{ClusterConfig, DropletConfig, Settings};
use anyhow::Result;

/// Public host serving Cloud Storage objects, used for the image raw disk
pub const STORAGE_PUBLIC_HOST: &str = "https://storage.googleapis.com";

/// Object key the release artifact is uploaded under
pub fn object_key(settings: &Settings, config: &ClusterConfig) -> String {
    format!("{}/{}", settings.image_name, config.release.file)
}

/// Image, instance group, TCP load balancer and control-plane firewall
pub fn cluster_graph(settings: &Settings, config: &ClusterConfig) -> Result<ResourceGraph> {
    let project = || Input::literal(config.project.expose());
    let region = || Input::literal(config.region.expose());
    let port = settings.port;

    let mut graph = ResourceGraph::new();

    graph.push(
        Descriptor::new(
            "bucket",
            ResourceKind::Bucket,
            &BucketArgs {
                name: settings.bucket_name.as_str().into(),
                location: region(),
                project: project(),
            },
        )?
        .export("bucketSelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "object",
            ResourceKind::BucketObject,
            &BucketObjectArgs {
                bucket: Input::output("bucket", OutputField::Name),
                name: object_key(settings, config).into(),
                source: Asset::RemoteAsset(config.release.url.expose().to_string()),
            },
        )?
        .export("objectSelfLink", OutputField::SelfLink),
    );

    // The raw disk source only names the bucket, so the dependency on the
    // uploaded object has to be declared explicitly.
    graph.push(
        Descriptor::new(
            "image",
            ResourceKind::Image,
            &ImageArgs {
                name: settings.image_name.as_str().into(),
                project: project(),
                architecture: Architecture::Arm64,
                guest_os_features: vec![GuestOsFeature {
                    feature_type: GuestOsFeatureType::VirtioScsiMultiqueue,
                }],
                raw_disk: RawDisk {
                    source: Input::Concat(vec![
                        Input::literal(format!("{}/", STORAGE_PUBLIC_HOST)),
                        Input::output("bucket", OutputField::Name),
                        Input::literal(format!("/{}", object_key(settings, config))),
                    ]),
                },
                storage_locations: vec![region()],
            },
        )?
        .depends_on("object")
        .export("imageSelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "ig",
            ResourceKind::InstanceGroup,
            &InstanceGroupArgs {
                name: settings.named("ig").into(),
                project: project(),
                zone: config.zone.expose().into(),
                named_ports: vec![NamedPort {
                    name: settings.named_port(),
                    port,
                }],
            },
        )?
        .export("groupSelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "health-check",
            ResourceKind::HealthCheck,
            &HealthCheckArgs {
                name: settings.named("health-check").into(),
                project: project(),
                check_type: Protocol::Tcp,
                tcp_health_check: TcpHealthCheck { port },
            },
        )?
        .export("healthcheckSelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "be",
            ResourceKind::BackendService,
            &BackendServiceArgs {
                name: settings.named("be").into(),
                project: project(),
                backends: vec![Backend {
                    group: Input::output("ig", OutputField::SelfLink),
                }],
                health_checks: vec![Input::output("health-check", OutputField::SelfLink)],
                port_name: settings.named_port(),
                protocol: Protocol::Tcp,
                timeout_sec: settings.timeout_sec,
            },
        )?
        .export("backendSelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "tcp-proxy",
            ResourceKind::TargetTcpProxy,
            &TargetTcpProxyArgs {
                name: settings.named("tcp-proxy").into(),
                project: project(),
                proxy_header: ProxyHeader::None,
                service: Input::output("be", OutputField::SelfLink),
            },
        )?
        .export("proxySelfLink", OutputField::SelfLink),
    );

    graph.push(
        Descriptor::new(
            "lb-ip",
            ResourceKind::GlobalAddress,
            &GlobalAddressArgs {
                name: settings.named("lb-ip").into(),
                project: project(),
            },
        )?
        .export("ipAddress", OutputField::Address),
    );

    graph.push(Descriptor::new(
        "fwd-rule",
        ResourceKind::GlobalForwardingRule,
        &GlobalForwardingRuleArgs {
            name: settings.named("fwd-rule").into(),
            project: project(),
            ip_address: Input::output("lb-ip", OutputField::Address),
            port_range: settings.forwarding_port_range.clone(),
            target: Input::output("tcp-proxy", OutputField::SelfLink),
        },
    )?);

    graph.push(Descriptor::new(
        "controlplane-firewall",
        ResourceKind::Firewall,
        &FirewallArgs {
            name: settings.named("controlplane-firewall").into(),
            project: project(),
            allowed: vec![FirewallAllowed {
                ip_protocol: "tcp".to_string(),
                ports: vec![port.to_string()],
            }],
            source_ranges: settings.health_check_ranges.clone(),
            target_tags: vec![settings.named("controlplane").into()],
        },
    )?);

    Ok(graph)
}

/// A single droplet, no dependencies
pub fn droplet_graph(settings: &Settings, config: &DropletConfig) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new();

    graph.push(
        Descriptor::new(
            "droplet",
            ResourceKind::Droplet,
            &DropletArgs {
                name: settings.named("droplet").into(),
                image: settings.droplet_image.clone(),
                region: settings.droplet_region.clone(),
                size: settings.droplet_size.clone(),
                ssh_keys: config.ssh_keys.clone(),
            },
        )?
        .export("dropletId", OutputField::Id)
        .export("dropletIp", OutputField::Address),
    );

    Ok(graph)
}
