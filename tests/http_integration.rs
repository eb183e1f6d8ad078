//! Integration tests for the provisioners using wiremock
//!
//! The whole cluster graph is applied against a mock server standing in for
//! Cloud Storage, Compute Engine and the release download host.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use talos_infra::config::{
    ClusterConfig, DropletConfig, Overrides, Release, Secret, Settings, StackFile,
};
use talos_infra::digitalocean::DigitalOceanClient;
use talos_infra::engine::{apply, ApplyOptions};
use talos_infra::gcp::auth::GcpCredentials;
use talos_infra::gcp::client::{Endpoints, GcpClient};
use talos_infra::gcp::operations::PollPolicy;
use talos_infra::resource::builder::{cluster_graph, droplet_graph};
use talos_infra::resource::dispatch::{
    DigitalOceanProvisioner, GcpProvisioner, PreviewProvisioner,
};
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUBLIC: &str = "https://www.googleapis.com/compute/v1/projects/test-project";

fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

fn cluster_config(server: &MockServer) -> ClusterConfig {
    ClusterConfig {
        project: Secret::new("test-project"),
        region: Secret::new("europe-west4"),
        zone: Secret::new("europe-west4-a"),
        release: Release::parse(&format!("{}/releases/v1.7.0/metal-arm64.raw.xz", server.uri()))
            .unwrap(),
    }
}

fn gcp_provisioner(server: &MockServer) -> GcpProvisioner {
    let client = GcpClient::with_credentials(
        GcpCredentials::from_token("test-token"),
        "test-project",
        "europe-west4-a",
        Endpoints::single(&server.uri()),
    )
    .unwrap();
    GcpProvisioner::new(client, fast_poll())
}

fn done_operation(id: &str, target: &str) -> Value {
    json!({
        "name": id,
        "status": "DONE",
        "selfLink": format!("{}/global/operations/{}", PUBLIC, id),
        "targetLink": target
    })
}

/// Mount an insert that finishes immediately and the GET of the created resource
async fn mount_compute(server: &MockServer, collection_path: &str, name: &str, resource: Value) {
    let target = format!("{}/{}/{}", PUBLIC, collection_path, name);

    Mock::given(method("POST"))
        .and(path(format!("/compute/v1/projects/test-project/{}", collection_path)))
        .and(bearer_token("test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(done_operation(&format!("op-{}", name), &target)),
        )
        .mount(server)
        .await;

    let mut body = resource;
    body["name"] = json!(name);
    body["selfLink"] = json!(target);

    Mock::given(method("GET"))
        .and(path(format!("/compute/v1/projects/test-project/{}/{}", collection_path, name)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_storage(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/storage/v1/b"))
        .and(query_param("project", "test-project"))
        .and(bearer_token("test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "storage#bucket",
            "name": "nhwk",
            "id": "nhwk",
            "selfLink": "https://www.googleapis.com/storage/v1/b/nhwk"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/v1.7.0/metal-arm64.raw.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"talos-disk-image".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/nhwk/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "talos/metal-arm64.raw.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "storage#object",
            "name": "talos/metal-arm64.raw.xz",
            "bucket": "nhwk",
            "id": "nhwk/talos/metal-arm64.raw.xz/1",
            "selfLink": "https://www.googleapis.com/storage/v1/b/nhwk/o/talos%2Fmetal-arm64.raw.xz"
        })))
        .mount(server)
        .await;
}

async fn mount_cluster(server: &MockServer) {
    mount_storage(server).await;
    let compute = [
        ("global/images", "talos", json!({"status": "READY"})),
        ("zones/europe-west4-a/instanceGroups", "talos-ig", json!({"size": 0})),
        ("global/healthChecks", "talos-health-check", json!({"type": "TCP"})),
        ("global/backendServices", "talos-be", json!({"protocol": "TCP"})),
        ("global/targetTcpProxies", "talos-tcp-proxy", json!({})),
        ("global/addresses", "talos-lb-ip", json!({"address": "34.120.1.2"})),
        ("global/forwardingRules", "talos-fwd-rule", json!({"IPAddress": "34.120.1.2"})),
        ("global/firewalls", "talos-controlplane-firewall", json!({})),
    ];
    for (collection_path, name, resource) in compute {
        mount_compute(server, collection_path, name, resource).await;
    }
}

/// Log output of the crate, collected in memory
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("talos_infra=trace"))
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Bodies of the POST requests received, in arrival order
async fn posted(server: &MockServer) -> Vec<(String, Value)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .map(|r| {
            let body = serde_json::from_slice(&r.body).unwrap_or(Value::Null);
            (r.url.path().to_string(), body)
        })
        .collect()
}

mod cluster_tests {
    use super::*;

    #[tokio::test]
    async fn test_up_creates_every_resource_and_exports_in_order() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let summary = apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .expect("Run should succeed");

        assert_eq!(
            summary.exports.names(),
            vec![
                "bucketSelfLink",
                "objectSelfLink",
                "imageSelfLink",
                "groupSelfLink",
                "healthcheckSelfLink",
                "backendSelfLink",
                "proxySelfLink",
                "ipAddress",
            ]
        );
        assert_eq!(summary.exports.get("ipAddress"), Some("34.120.1.2"));
        assert_eq!(
            summary.exports.get("imageSelfLink"),
            Some(format!("{}/global/images/talos", PUBLIC).as_str())
        );
        assert_eq!(summary.resources.len(), 10);
        assert_eq!(summary.provisioner, "gcp");
    }

    #[tokio::test]
    async fn test_image_is_built_from_the_uploaded_object() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        let posts = posted(&server).await;
        let upload = posts
            .iter()
            .position(|(p, _)| p == "/upload/storage/v1/b/nhwk/o")
            .expect("object uploaded");
        let image = posts
            .iter()
            .position(|(p, _)| p.ends_with("/global/images"))
            .expect("image inserted");
        assert!(upload < image);

        let body = &posts[image].1;
        assert_eq!(
            body["rawDisk"]["source"],
            "https://storage.googleapis.com/nhwk/talos/metal-arm64.raw.xz"
        );
        assert_eq!(body["architecture"], "ARM64");
        assert_eq!(body["storageLocations"], json!(["europe-west4"]));
        assert!(body.get("project").is_none());
    }

    #[tokio::test]
    async fn test_upload_streams_the_release_bytes() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.url.path() == "/upload/storage/v1/b/nhwk/o")
            .unwrap();
        assert_eq!(upload.body, b"talos-disk-image".to_vec());
    }

    #[tokio::test]
    async fn test_generated_links_flow_into_later_bodies() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        let posts = posted(&server).await;
        let body_of = |suffix: &str| {
            posts
                .iter()
                .find(|(p, _)| p.ends_with(suffix))
                .map(|(_, b)| b.clone())
                .unwrap()
        };

        let backend = body_of("/global/backendServices");
        assert_eq!(
            backend["backends"][0]["group"],
            format!("{}/zones/europe-west4-a/instanceGroups/talos-ig", PUBLIC)
        );
        assert_eq!(
            backend["healthChecks"][0],
            format!("{}/global/healthChecks/talos-health-check", PUBLIC)
        );
        assert_eq!(backend["portName"], "tcp6443");
        assert_eq!(backend["timeoutSec"], 300);

        let rule = body_of("/global/forwardingRules");
        assert_eq!(rule["IPAddress"], "34.120.1.2");
        assert_eq!(rule["portRange"], "443");
        assert_eq!(
            rule["target"],
            format!("{}/global/targetTcpProxies/talos-tcp-proxy", PUBLIC)
        );

        let group = body_of("/instanceGroups");
        assert!(group.get("zone").is_none());
        assert_eq!(group["namedPorts"], json!([{"name": "tcp6443", "port": 6443}]));
    }

    #[tokio::test]
    async fn test_firewall_admits_health_checks() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        let posts = posted(&server).await;
        let (_, firewall) = posts
            .iter()
            .find(|(p, _)| p.ends_with("/global/firewalls"))
            .unwrap();

        assert_eq!(firewall["name"], "talos-controlplane-firewall");
        assert_eq!(firewall["allowed"], json!([{"IPProtocol": "tcp", "ports": ["6443"]}]));
        assert_eq!(firewall["sourceRanges"], json!(["130.211.0.0/22", "35.191.0.0/16"]));
        assert_eq!(firewall["targetTags"], json!(["talos-controlplane"]));
    }

    #[tokio::test]
    async fn test_parallel_up_produces_the_same_exports() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let summary = apply(&graph, &gcp_provisioner(&server), ApplyOptions { parallel: true })
            .await
            .unwrap();

        assert_eq!(summary.exports.len(), 8);
        assert_eq!(summary.exports.names()[0], "bucketSelfLink");
        assert_eq!(summary.exports.names()[7], "ipAddress");
    }

    #[tokio::test]
    async fn test_failed_insert_stops_the_run() {
        let server = MockServer::start().await;

        // Mounted first so it wins over the successful health check mock
        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/test-project/global/healthChecks"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "Required 'compute.healthChecks.create' permission"
                }
            })))
            .mount(&server)
            .await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let err = apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to create health-check"));
        assert!(message.contains("403"));

        let posts = posted(&server).await;
        assert!(!posts.iter().any(|(p, _)| p.ends_with("/global/backendServices")));
        assert!(!posts.iter().any(|(p, _)| p.ends_with("/global/firewalls")));
    }

    #[tokio::test]
    async fn test_pending_operation_is_polled_until_done() {
        let server = MockServer::start().await;
        let target = format!("{}/global/healthChecks/talos-health-check", PUBLIC);

        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/test-project/global/healthChecks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-hc",
                "status": "RUNNING",
                "selfLink": format!("{}/global/operations/op-hc", PUBLIC),
                "targetLink": target
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/global/operations/op-hc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(done_operation("op-hc", &target)),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let summary = apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.exports.get("healthcheckSelfLink"), Some(target.as_str()));
    }

    #[tokio::test]
    async fn test_operation_error_fails_the_resource() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/test-project/global/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-image",
                "status": "DONE",
                "error": {"errors": [{
                    "code": "INVALID_FIELD_VALUE",
                    "message": "rawDisk.source is not readable"
                }]}
            })))
            .mount(&server)
            .await;
        mount_cluster(&server).await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let err = apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to create image"));
        assert!(message.contains("INVALID_FIELD_VALUE"));
    }

    #[tokio::test]
    async fn test_release_url_stays_out_of_logs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private-token-abc/metal-arm64.raw.xz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"talos-disk-image".to_vec()))
            .mount(&server)
            .await;
        mount_cluster(&server).await;

        let mut config = cluster_config(&server);
        config.release =
            Release::parse(&format!("{}/private-token-abc/metal-arm64.raw.xz", server.uri()))
                .unwrap();

        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let graph = cluster_graph(&Settings::default(), &config).unwrap();
        apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap();

        let output = logs.contents();
        assert!(output.contains("Fetching remote asset"));
        assert!(!output.contains("private-token-abc"));
        assert!(!format!("{:?}", config).contains("private-token-abc"));
    }

    #[tokio::test]
    async fn test_release_url_stays_out_of_errors() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        // Nothing is mounted on this path, so the download gets a 404
        let mut config = cluster_config(&server);
        config.release =
            Release::parse(&format!("{}/private-token-abc/metal-arm64.raw.xz", server.uri()))
                .unwrap();

        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let graph = cluster_graph(&Settings::default(), &config).unwrap();
        let err = apply(&graph, &gcp_provisioner(&server), ApplyOptions::default())
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to fetch remote asset"));
        assert!(message.contains("404"));
        assert!(!message.contains("private-token-abc"));
        assert!(!format!("{:?}", err).contains("private-token-abc"));
        assert!(!logs.contents().contains("private-token-abc"));
    }

    #[tokio::test]
    async fn test_missing_configuration_sends_nothing() {
        let server = MockServer::start().await;
        mount_cluster(&server).await;

        let stack = StackFile::parse(
            "config:\n  google-native:project: test-project\n  google-native:region: europe-west4\n",
        )
        .unwrap();
        let overrides = Overrides {
            release: Some(format!("{}/releases/v1.7.0/metal-arm64.raw.xz", server.uri())),
            ..Default::default()
        };

        let provisioner = gcp_provisioner(&server);
        let result = match ClusterConfig::resolve(&stack, &overrides) {
            Ok(config) => {
                let graph = cluster_graph(&Settings::default(), &config).unwrap();
                apply(&graph, &provisioner, ApplyOptions::default()).await.map(|_| ())
            }
            Err(err) => Err(err.into()),
        };

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("google-native:zone"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preview_makes_no_requests() {
        let server = MockServer::start().await;

        let graph = cluster_graph(&Settings::default(), &cluster_config(&server)).unwrap();
        let summary = apply(&graph, &PreviewProvisioner, ApplyOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.exports.get("ipAddress"), Some("<lb-ip.address>"));
        assert_eq!(summary.exports.len(), 8);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

mod droplet_tests {
    use super::*;

    #[tokio::test]
    async fn test_droplet_is_created_and_awaited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/droplets"))
            .and(bearer_token("do-token"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "droplet": {"id": 3164444, "name": "talos-droplet", "status": "new"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/droplets/3164444"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "droplet": {
                    "id": 3164444,
                    "name": "talos-droplet",
                    "status": "active",
                    "networks": {
                        "v4": [
                            {"ip_address": "10.128.192.124", "type": "private"},
                            {"ip_address": "104.236.32.182", "type": "public"}
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let config = DropletConfig {
            token: Secret::new("do-token"),
            ssh_keys: vec!["289794".to_string()],
        };
        let client =
            DigitalOceanClient::with_base_url(config.token.clone(), &format!("{}/v2", server.uri()))
                .unwrap();
        let provisioner = DigitalOceanProvisioner::new(client, fast_poll());

        let graph = droplet_graph(&Settings::default(), &config).unwrap();
        let summary = apply(&graph, &provisioner, ApplyOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.exports.names(), vec!["dropletId", "dropletIp"]);
        assert_eq!(summary.exports.get("dropletId"), Some("3164444"));
        assert_eq!(summary.exports.get("dropletIp"), Some("104.236.32.182"));

        let posts = posted(&server).await;
        assert_eq!(
            posts[0].1,
            json!({
                "name": "talos-droplet",
                "region": "nyc3",
                "size": "s-1vcpu-1gb",
                "image": "ubuntu-22-04-x64",
                "ssh_keys": ["289794"]
            })
        );
    }

    #[tokio::test]
    async fn test_droplet_rejected_by_the_api() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/droplets"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "id": "unauthorized",
                "message": "Unable to authenticate you"
            })))
            .mount(&server)
            .await;

        let config = DropletConfig {
            token: Secret::new("bad-token"),
            ssh_keys: vec![],
        };
        let client =
            DigitalOceanClient::with_base_url(config.token.clone(), &format!("{}/v2", server.uri()))
                .unwrap();
        let provisioner = DigitalOceanProvisioner::new(client, fast_poll());

        let graph = droplet_graph(&Settings::default(), &config).unwrap();
        let err = apply(&graph, &provisioner, ApplyOptions::default())
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("Failed to create droplet"));
        assert!(message.contains("401"));
        assert!(message.contains("Unable to authenticate you"));
    }
}
