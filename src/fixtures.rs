//! Resource spec builders
//!
//! Pure constructors for the objects a test context submits: containers,
//! resource requirements, pods, services, service ports and network
//! policies. Nothing here talks to a cluster.
//!
//! # Example
//!
//! ```
//! use ephemera::fixtures::{
//!     namespace_allow_policy, network_policy_port, resource_requirements, service_port,
//!     ContainerConfig,
//! };
//!
//! let server = ContainerConfig::new("test-container", "httpd:2.4")
//!     .resources(resource_requirements("250m", "1000m", "1Gi", "1Gi"))
//!     .port(80);
//!
//! let http = service_port("http", 80, 80, "TCP");
//! let policy = namespace_allow_policy("allow-80", "core", vec![network_policy_port(80, "TCP")]);
//!
//! assert_eq!(http.port, 80);
//! assert_eq!(policy.metadata.namespace.as_deref(), Some("core"));
//! # let _ = server;
//! ```

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, ResourceRequirements, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Label every harness object carries
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "ephemera";

/// Prefix of the status line written by [`http_probe_command`]
pub const RESPONSE_CODE_PREFIX: &str = "HTTP Response Code: ";

/// The status line a probe prints for a given HTTP code
///
/// `"000"` is what curl reports when no response arrived at all.
#[must_use]
pub fn response_line(code: &str) -> String {
    format!("{RESPONSE_CODE_PREFIX}{code}")
}

/// Transport protocol for service and policy ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    /// Lenient parse: unrecognized names fall back to TCP
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "UDP" => Self::Udp,
            "SCTP" => Self::Sctp,
            _ => Self::Tcp,
        }
    }

    /// Kubernetes wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Sctp => "SCTP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service exposure type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    /// Kubernetes wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clusterip" => Ok(Self::ClusterIP),
            "nodeport" => Ok(Self::NodePort),
            "loadbalancer" | "lb" => Ok(Self::LoadBalancer),
            _ => Err(format!(
                "unknown service type '{s}' (expected ClusterIP, NodePort or LoadBalancer)"
            )),
        }
    }
}

/// Container description used to build test pods
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub resources: Option<ResourceRequirements>,
    pub ports: Vec<u16>,
}

impl ContainerConfig {
    /// Create a container with the image's default entrypoint
    #[must_use]
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            command: Vec::new(),
            resources: None,
            ports: Vec::new(),
        }
    }

    /// Override the container command
    #[must_use]
    pub fn command<S: AsRef<str>>(mut self, cmd: &[S]) -> Self {
        self.command = cmd.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Set resource requests and limits
    #[must_use]
    pub fn resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Declare a container port
    ///
    /// # Panics
    /// Panics if port is zero
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        assert!(port > 0, "port must be in range 1-65535, got {port}");
        self.ports.push(port);
        self
    }

    /// Convert to the Kubernetes container type
    #[must_use]
    pub fn to_container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            command: if self.command.is_empty() {
                None
            } else {
                Some(self.command.clone())
            },
            resources: self.resources.clone(),
            ports: if self.ports.is_empty() {
                None
            } else {
                Some(
                    self.ports
                        .iter()
                        .map(|p| ContainerPort {
                            container_port: i32::from(*p),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            ..Default::default()
        }
    }
}

/// Container from name, image, optional command and optional resources
#[must_use]
pub fn container_config(
    name: &str,
    image: &str,
    command: Option<&[&str]>,
    resources: Option<ResourceRequirements>,
) -> ContainerConfig {
    let mut config = ContainerConfig::new(name, image);
    if let Some(cmd) = command {
        config = config.command(cmd);
    }
    config.resources = resources;
    config
}

/// Requests and limits from Kubernetes quantity strings
#[must_use]
pub fn resource_requirements(
    cpu_request: &str,
    cpu_limit: &str,
    memory_request: &str,
    memory_limit: &str,
) -> ResourceRequirements {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };

    ResourceRequirements {
        requests: Some(quantities(cpu_request, memory_request)),
        limits: Some(quantities(cpu_limit, memory_limit)),
        ..Default::default()
    }
}

/// A container that requests `target` once and prints the response code
///
/// The last line of its output is `HTTP Response Code: <code>`, with `000`
/// when nothing answered within five seconds.
#[must_use]
pub fn http_probe_container(name: &str, image: &str, target: &str) -> ContainerConfig {
    ContainerConfig::new(name, image)
        .command(&http_probe_command(target))
        .resources(resource_requirements("100m", "400m", "200Mi", "200Mi"))
}

/// The curl invocation used by probe containers
#[must_use]
pub fn http_probe_command(target: &str) -> Vec<String> {
    let url = if target.contains("://") {
        target.to_string()
    } else {
        format!("http://{target}")
    };
    vec![
        "curl".to_string(),
        "--max-time".to_string(),
        "5".to_string(),
        "-w".to_string(),
        format!("{RESPONSE_CODE_PREFIX}%{{http_code}}\n"),
        url,
    ]
}

fn default_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), name.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}

/// Single-run test pod labelled `app=<name>`
///
/// Restart policy is `Never`, so a probe that fails stays `Failed` instead of
/// crash-looping.
#[must_use]
pub fn test_pod(name: &str, namespace: &str, containers: &[ContainerConfig]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(default_labels(name)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers.iter().map(ContainerConfig::to_container).collect(),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Service port descriptor; unrecognized protocols fall back to TCP
#[must_use]
pub fn service_port(name: &str, port: u16, target_port: u16, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port: i32::from(port),
        target_port: Some(IntOrString::Int(i32::from(target_port))),
        protocol: Some(Protocol::parse(protocol).to_string()),
        ..Default::default()
    }
}

/// Service descriptor
///
/// A missing selector defaults to `app=<name>`.
#[must_use]
pub fn service(
    name: &str,
    namespace: &str,
    service_type: ServiceType,
    ports: Vec<ServicePort>,
    selector: Option<BTreeMap<String, String>>,
) -> Service {
    let selector =
        selector.unwrap_or_else(|| BTreeMap::from([("app".to_string(), name.to_string())]));

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(default_labels(name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            ports: Some(ports),
            selector: Some(selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Network policy port descriptor; unrecognized protocols fall back to TCP
#[must_use]
pub fn network_policy_port(port: u16, protocol: &str) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some(Protocol::parse(protocol).to_string()),
        ..Default::default()
    }
}

/// Ingress policy admitting traffic from every namespace on `ports`
///
/// Selects all pods of `namespace`. Where the cluster denies cross-namespace
/// traffic by default, this is what turns it back on.
#[must_use]
pub fn namespace_allow_policy(
    name: &str,
    namespace: &str,
    ports: Vec<NetworkPolicyPort>,
) -> NetworkPolicy {
    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(default_labels(name)),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            // Empty selector matches every pod in the namespace
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(LabelSelector::default()),
                    ..Default::default()
                }]),
                ports: Some(ports),
            }]),
            egress: None,
        }),
    }
}
