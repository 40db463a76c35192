//! Simulated cluster
//!
//! `InMemoryGateway` keeps objects in memory and imitates the parts of a
//! cluster the harness depends on:
//! - pods move through a scripted sequence of phases, one step per read
//! - pod logs come from a script, one entry per read (the last one sticks)
//! - service cluster IPs appear after a configurable number of reads
//! - deleted pods can stay readable for a number of reads, like a pod that
//!   is still terminating
//! - probe pods (`curl http://<service>`) are answered by a network model:
//!   a service without a backing pod never answers, and cross-namespace
//!   traffic is denied unless a network policy selecting the backing pod
//!   admits other namespaces on the target port. A new policy only takes
//!   effect after a propagation delay.
//!
//! # Example
//!
//! ```
//! use ephemera::gateway::InMemoryGateway;
//! use std::time::Duration;
//!
//! let gateway = InMemoryGateway::new()
//!     .with_namespace("core")
//!     .service_ip_after(2)
//!     .policy_propagation(Duration::from_secs(10));
//!
//! gateway.script_pod_phases("flaky", &["Pending", "Pending", "Running"]);
//! # let _ = gateway;
//! ```

use super::{ClusterGateway, GatewayError};
use crate::context::ResourceKind;
use crate::fixtures::response_line;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
    ContainerStatus, Namespace, NamespaceStatus, Pod, PodStatus, Service,
};
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicyPort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

struct PodEntry {
    pod: Pod,
    phases: VecDeque<String>,
    logs: VecDeque<String>,
    /// Reads left before a deleted pod disappears
    terminating: Option<u32>,
}

struct ServiceEntry {
    service: Service,
    reads_until_ip: u32,
    withheld: bool,
}

struct PolicyEntry {
    policy: NetworkPolicy,
    effective_at: Instant,
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    pods: BTreeMap<Key, PodEntry>,
    services: BTreeMap<Key, ServiceEntry>,
    policies: BTreeMap<Key, PolicyEntry>,
    phase_scripts: HashMap<String, Vec<String>>,
    log_scripts: HashMap<String, Vec<String>>,
    withheld_ips: HashSet<String>,
    failing_deletes: HashSet<String>,
    deletion_delays: HashMap<String, u32>,
    deletions: Vec<(ResourceKind, String, String)>,
    next_ip: u32,
    unreachable: bool,
}

/// Where a probe pod's request ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeVerdict {
    Allowed,
    Denied,
}

/// In-memory [`ClusterGateway`]
pub struct InMemoryGateway {
    state: Mutex<State>,
    ip_after_reads: u32,
    propagation: Duration,
    deny_cross_namespace: bool,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Empty cluster: no namespaces, IPs on the second read, policies
    /// effective immediately, cross-namespace traffic denied by default
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            ip_after_reads: 1,
            propagation: Duration::ZERO,
            deny_cross_namespace: true,
        }
    }

    /// Start with an existing namespace
    #[must_use]
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.add_namespace(namespace);
        self
    }

    /// Number of service reads that see no cluster IP before one is assigned
    #[must_use]
    pub fn service_ip_after(mut self, reads: u32) -> Self {
        self.ip_after_reads = reads;
        self
    }

    /// Delay between creating a network policy and it being enforced
    #[must_use]
    pub fn policy_propagation(mut self, delay: Duration) -> Self {
        self.propagation = delay;
        self
    }

    /// Let cross-namespace traffic through without any policy
    #[must_use]
    pub fn allow_cross_namespace_by_default(mut self) -> Self {
        self.deny_cross_namespace = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self) -> Result<MutexGuard<'_, State>, GatewayError> {
        let state = self.state();
        if state.unreachable {
            return Err(GatewayError::Unreachable(
                "in-memory cluster marked unreachable".to_string(),
            ));
        }
        Ok(state)
    }

    /// Create a namespace out of band
    pub fn add_namespace(&self, namespace: &str) {
        self.state().namespaces.insert(namespace.to_string());
    }

    /// Phases the next pod named `name` reports, one per read
    ///
    /// Besides the real phases, `"CrashLoopBackOff"` reports a running pod
    /// whose container is crash-looping.
    pub fn script_pod_phases(&self, name: &str, phases: &[&str]) {
        self.state().phase_scripts.insert(
            name.to_string(),
            phases.iter().map(|p| (*p).to_string()).collect(),
        );
    }

    /// Log output the next pod named `name` returns, one entry per read
    pub fn script_pod_logs(&self, name: &str, logs: &[&str]) {
        self.state().log_scripts.insert(
            name.to_string(),
            logs.iter().map(|l| (*l).to_string()).collect(),
        );
    }

    /// Never assign a cluster IP to services named `name`
    pub fn withhold_service_ip(&self, name: &str) {
        self.state().withheld_ips.insert(name.to_string());
    }

    /// Make every deletion of objects named `name` fail with a server error
    pub fn fail_deletes_of(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_string());
    }

    /// Keep deleted pods named `name` readable for `reads` more reads
    ///
    /// Deleting such a pod succeeds at once but it lingers as terminating,
    /// the way a real pod does during graceful shutdown. `u32::MAX` keeps it
    /// around for good.
    pub fn delay_pod_deletion(&self, name: &str, reads: u32) {
        self.state().deletion_delays.insert(name.to_string(), reads);
    }

    /// Toggle whether every call fails as unreachable
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Whether a namespace exists
    #[must_use]
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state().namespaces.contains(namespace)
    }

    /// Whether an object exists
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        let state = self.state();
        let k = key(namespace, name);
        match kind {
            ResourceKind::Pod => state.pods.contains_key(&k),
            ResourceKind::Service => state.services.contains_key(&k),
            ResourceKind::NetworkPolicy => state.policies.contains_key(&k),
        }
    }

    /// Number of objects left in a namespace
    #[must_use]
    pub fn object_count(&self, namespace: &str) -> usize {
        let state = self.state();
        state.pods.keys().filter(|(ns, _)| ns == namespace).count()
            + state.services.keys().filter(|(ns, _)| ns == namespace).count()
            + state.policies.keys().filter(|(ns, _)| ns == namespace).count()
    }

    /// Successful deletions, in order
    #[must_use]
    pub fn deletions(&self) -> Vec<(ResourceKind, String, String)> {
        self.state().deletions.clone()
    }

    fn require_namespace(state: &State, namespace: &str) -> Result<(), GatewayError> {
        if state.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(GatewayError::not_found("Namespace", namespace))
        }
    }

    /// Decide how a probe pod's request fares, if the pod is a probe
    fn evaluate_probe(&self, state: &State, client_ns: &str, pod: &Pod) -> Option<ProbeVerdict> {
        let target = probe_target(pod)?;
        let (host, port) = split_host_port(&target);

        let Some(((svc_ns, _), entry)) = state.services.iter().find(|((ns, name), entry)| {
            let ip = entry
                .service
                .spec
                .as_ref()
                .and_then(|s| s.cluster_ip.as_deref());
            ip == Some(host)
                || host == name.as_str()
                || host.starts_with(&format!("{name}.{ns}"))
        }) else {
            return Some(ProbeVerdict::Denied);
        };

        let Some(target_port) = backend_port(&entry.service, port) else {
            return Some(ProbeVerdict::Denied);
        };

        // Nothing behind the service, so nothing answers
        let backends = backends(state, svc_ns, &entry.service);
        if backends.is_empty() {
            return Some(ProbeVerdict::Denied);
        }

        if svc_ns == client_ns || !self.deny_cross_namespace {
            return Some(ProbeVerdict::Allowed);
        }

        let now = Instant::now();
        let admitted = state
            .policies
            .iter()
            .filter(|((ns, _), p)| ns == svc_ns && p.effective_at <= now)
            .filter(|(_, p)| {
                backends
                    .iter()
                    .any(|pod| policy_selects(&p.policy, pod))
            })
            .any(|(_, p)| policy_admits_other_namespaces(&p.policy, target_port));

        Some(if admitted {
            ProbeVerdict::Allowed
        } else {
            ProbeVerdict::Denied
        })
    }
}

/// The URL a curl-based probe container requests
fn probe_target(pod: &Pod) -> Option<String> {
    let spec = pod.spec.as_ref()?;
    spec.containers.iter().find_map(|c| {
        let command = c.command.as_ref()?;
        if !command.iter().any(|arg| arg.contains("curl")) {
            return None;
        }
        command
            .iter()
            .chain(c.args.iter().flatten())
            .find(|arg| arg.starts_with("http://") || arg.starts_with("https://"))
            .cloned()
    })
}

/// Host and port from a URL, defaulting the port by scheme
fn split_host_port(url: &str) -> (&str, u16) {
    let (default_port, rest) = match url.split_once("://") {
        Some(("https", rest)) => (443, rest),
        Some((_, rest)) => (80, rest),
        None => (80, url),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(default_port)),
        None => (authority, default_port),
    }
}

/// The pod port a service port forwards to, if the service exposes it
fn backend_port(service: &Service, port: u16) -> Option<u16> {
    let ports = service.spec.as_ref()?.ports.as_ref()?;
    let matched = ports.iter().find(|p| p.port == i32::from(port))?;
    match &matched.target_port {
        Some(IntOrString::Int(target)) => u16::try_from(*target).ok(),
        _ => Some(port),
    }
}

/// Live pods in `namespace` matched by the service's selector
///
/// A service without a selector has no backends here; endpoints are never
/// managed by hand.
fn backends<'a>(state: &'a State, namespace: &str, service: &Service) -> Vec<&'a Pod> {
    let Some(selector) = service
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .filter(|s| !s.is_empty())
    else {
        return Vec::new();
    };

    state
        .pods
        .iter()
        .filter(|((ns, _), entry)| ns == namespace && entry.terminating.is_none())
        .map(|(_, entry)| &entry.pod)
        .filter(|pod| {
            let labels = pod.metadata.labels.as_ref();
            selector
                .iter()
                .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
        })
        .collect()
}

/// Whether `selector` matches the pod's labels
///
/// Only `matchLabels` is evaluated; an empty selector matches every pod.
fn label_selector_matches(selector: &LabelSelector, pod: &Pod) -> bool {
    let labels = pod.metadata.labels.as_ref();
    selector.match_labels.as_ref().is_none_or(|wanted| {
        wanted
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    })
}

/// Whether a policy applies to `pod`
fn policy_selects(policy: &NetworkPolicy, pod: &Pod) -> bool {
    policy
        .spec
        .as_ref()
        .is_some_and(|s| label_selector_matches(&s.pod_selector, pod))
}

fn port_matches(ports: Option<&Vec<NetworkPolicyPort>>, port: u16) -> bool {
    match ports {
        None => true,
        Some(ports) if ports.is_empty() => true,
        Some(ports) => ports.iter().any(|p| match &p.port {
            None | Some(IntOrString::String(_)) => true,
            Some(IntOrString::Int(n)) => *n == i32::from(port),
        }),
    }
}

/// Whether an ingress rule admits pods from other namespaces on `port`
///
/// Label selectors are not evaluated; any namespace selector counts as
/// "other namespaces".
fn policy_admits_other_namespaces(policy: &NetworkPolicy, port: u16) -> bool {
    let Some(rules) = policy.spec.as_ref().and_then(|s| s.ingress.as_ref()) else {
        return false;
    };
    rules.iter().any(|rule| {
        let from_other_namespaces = match &rule.from {
            None => true,
            Some(peers) => peers.iter().any(|p| p.namespace_selector.is_some()),
        };
        from_other_namespaces && port_matches(rule.ports.as_ref(), port)
    })
}

fn container_state(phase: &str) -> (bool, ContainerState) {
    match phase {
        "Running" => (
            true,
            ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            },
        ),
        "Succeeded" => (
            false,
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 0,
                    reason: Some("Completed".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ),
        "Failed" => (
            false,
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 1,
                    reason: Some("Error".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ),
        "CrashLoopBackOff" => (
            false,
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("CrashLoopBackOff".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ),
        _ => (
            false,
            ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("ContainerCreating".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ),
    }
}

fn apply_phase(pod: &mut Pod, phase: &str) {
    let (ready, state) = container_state(phase);
    let reported_phase = if phase == "CrashLoopBackOff" {
        "Running"
    } else {
        phase
    };

    let statuses = pod
        .spec
        .as_ref()
        .map(|s| {
            s.containers
                .iter()
                .map(|c| ContainerStatus {
                    name: c.name.clone(),
                    image: c.image.clone().unwrap_or_default(),
                    ready,
                    state: Some(state.clone()),
                    ..Default::default()
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    pod.status = Some(PodStatus {
        phase: Some(reported_phase.to_string()),
        container_statuses: Some(statuses),
        ..Default::default()
    });
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.trim().is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(String::as_str) == Some(v.trim()),
            None => labels.contains_key(term.trim()),
        })
}

fn pop_sticky(queue: &mut VecDeque<String>) -> String {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or_default()
    } else {
        queue.front().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ClusterGateway for InMemoryGateway {
    async fn get_namespace(&self, name: &str) -> Result<Namespace, GatewayError> {
        let state = self.reachable()?;
        Self::require_namespace(&state, name)?;
        Ok(Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NamespaceStatus {
                phase: Some("Active".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, GatewayError> {
        let mut state = self.reachable()?;
        let name = namespace.metadata.name.clone().unwrap_or_default();
        if !state.namespaces.insert(name.clone()) {
            return Err(GatewayError::already_exists("Namespace", &name));
        }
        Ok(namespace.clone())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), GatewayError> {
        let mut state = self.reachable()?;
        if !state.namespaces.remove(name) {
            return Err(GatewayError::not_found("Namespace", name));
        }
        state.pods.retain(|(ns, _), _| ns != name);
        state.services.retain(|(ns, _), _| ns != name);
        state.policies.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, GatewayError> {
        let mut state = self.reachable()?;
        Self::require_namespace(&state, namespace)?;

        let name = pod.metadata.name.clone().unwrap_or_default();
        let k = key(namespace, &name);
        if state.pods.contains_key(&k) {
            return Err(GatewayError::already_exists("Pod", &name));
        }

        let verdict = self.evaluate_probe(&state, namespace, pod);
        let (default_phases, default_logs) = match verdict {
            Some(ProbeVerdict::Allowed) => (vec!["Pending", "Succeeded"], response_line("200")),
            Some(ProbeVerdict::Denied) => (vec!["Pending", "Failed"], response_line("000")),
            None => (vec!["Pending", "Running"], String::new()),
        };

        let phases: VecDeque<String> = state
            .phase_scripts
            .remove(&name)
            .unwrap_or_else(|| default_phases.iter().map(|p| (*p).to_string()).collect())
            .into();
        let logs: VecDeque<String> = state
            .log_scripts
            .remove(&name)
            .unwrap_or_else(|| vec![default_logs])
            .into();

        let mut stored = pod.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        apply_phase(&mut stored, phases.front().map_or("Pending", String::as_str));

        debug!(namespace = %namespace, pod = %name, verdict = ?verdict, "Simulated pod created");

        state.pods.insert(
            k,
            PodEntry {
                pod: stored.clone(),
                phases,
                logs,
                terminating: None,
            },
        );
        Ok(stored)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError> {
        let mut state = self.reachable()?;
        let k = key(namespace, name);
        let terminating = state
            .pods
            .get(&k)
            .ok_or_else(|| GatewayError::not_found("Pod", name))?
            .terminating;
        if terminating == Some(0) {
            state.pods.remove(&k);
            return Err(GatewayError::not_found("Pod", name));
        }

        let entry = state
            .pods
            .get_mut(&k)
            .ok_or_else(|| GatewayError::not_found("Pod", name))?;
        if let Some(left) = entry.terminating.as_mut() {
            *left = left.saturating_sub(1);
            return Ok(entry.pod.clone());
        }

        let phase = pop_sticky(&mut entry.phases);
        apply_phase(&mut entry.pod, &phase);
        Ok(entry.pod.clone())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<Pod>, GatewayError> {
        let state = self.reachable()?;
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, entry)| &entry.pod)
            .filter(|pod| selector.is_none_or(|s| matches_selector(pod, s)))
            .cloned()
            .collect())
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, GatewayError> {
        let mut state = self.reachable()?;
        let entry = state
            .pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| GatewayError::not_found("Pod", name))?;
        Ok(pop_sticky(&mut entry.logs))
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, GatewayError> {
        let mut state = self.reachable()?;
        Self::require_namespace(&state, namespace)?;

        let name = service.metadata.name.clone().unwrap_or_default();
        let k = key(namespace, &name);
        if state.services.contains_key(&k) {
            return Err(GatewayError::already_exists("Service", &name));
        }

        let mut stored = service.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        let withheld = state.withheld_ips.contains(&name);
        state.services.insert(
            k,
            ServiceEntry {
                service: stored.clone(),
                reads_until_ip: self.ip_after_reads,
                withheld,
            },
        );
        Ok(stored)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, GatewayError> {
        let mut state = self.reachable()?;
        let next_ip = state.next_ip;
        let entry = state
            .services
            .get_mut(&key(namespace, name))
            .ok_or_else(|| GatewayError::not_found("Service", name))?;

        let mut assigned = false;
        if !entry.withheld {
            if entry.reads_until_ip == 0 {
                if let Some(spec) = entry.service.spec.as_mut() {
                    if spec.cluster_ip.is_none() {
                        spec.cluster_ip = Some(format!("10.96.{}.{}", next_ip / 250, next_ip % 250 + 2));
                        assigned = true;
                    }
                }
            } else {
                entry.reads_until_ip -= 1;
            }
        }
        let service = entry.service.clone();
        if assigned {
            state.next_ip += 1;
        }
        Ok(service)
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError> {
        let state = self.reachable()?;
        Ok(state
            .services
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, entry)| entry.service.clone())
            .collect())
    }

    async fn create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<NetworkPolicy, GatewayError> {
        let mut state = self.reachable()?;
        Self::require_namespace(&state, namespace)?;

        let name = policy.metadata.name.clone().unwrap_or_default();
        let k = key(namespace, &name);
        if state.policies.contains_key(&k) {
            return Err(GatewayError::already_exists("NetworkPolicy", &name));
        }

        let mut stored = policy.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        state.policies.insert(
            k,
            PolicyEntry {
                policy: stored.clone(),
                effective_at: Instant::now() + self.propagation,
            },
        );
        Ok(stored)
    }

    async fn get_network_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicy, GatewayError> {
        let state = self.reachable()?;
        state
            .policies
            .get(&key(namespace, name))
            .map(|entry| entry.policy.clone())
            .ok_or_else(|| GatewayError::not_found("NetworkPolicy", name))
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicy>, GatewayError> {
        let state = self.reachable()?;
        Ok(state
            .policies
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, entry)| entry.policy.clone())
            .collect())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.reachable()?;
        if state.failing_deletes.contains(name) {
            return Err(GatewayError::Api {
                kind: kind.to_string(),
                name: name.to_string(),
                code: 500,
                message: "simulated deletion failure".to_string(),
            });
        }

        let k = key(namespace, name);
        let delay = state.deletion_delays.get(name).copied().unwrap_or(0);
        let removed = match kind {
            ResourceKind::Pod => {
                let terminating = state.pods.get(&k).map(|entry| entry.terminating.is_some());
                match terminating {
                    None => false,
                    // Deleting a terminating pod again is accepted and changes nothing
                    Some(true) => return Ok(()),
                    Some(false) if delay > 0 => {
                        if let Some(entry) = state.pods.get_mut(&k) {
                            entry.terminating = Some(delay);
                        }
                        true
                    }
                    Some(false) => state.pods.remove(&k).is_some(),
                }
            }
            ResourceKind::Service => state.services.remove(&k).is_some(),
            ResourceKind::NetworkPolicy => state.policies.remove(&k).is_some(),
        };

        if !removed {
            return Err(GatewayError::not_found(kind.as_str(), name));
        }
        state
            .deletions
            .push((kind, namespace.to_string(), name.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
