use super::pods::failure_reason;
use super::types::ResourceKind;
use super::{ContextError, TestContext};
use crate::eventually::{poll, Attempt, Budget, PollError};
use crate::fixtures::{namespace_allow_policy, ContainerConfig};
use crate::gateway::{ClusterGateway, GatewayError};
use crate::wait::WaitError;
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicyPort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Submit a policy admitting traffic from every namespace on `ports`
///
/// Only submits. Enforcement happens asynchronously in the cluster's
/// network plugin, so traffic may still be denied for a while after this
/// returns.
pub async fn create_network_policy_with_namespace_allow(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    name: &str,
    ports: Vec<NetworkPolicyPort>,
) -> Result<NetworkPolicy, GatewayError> {
    let policy = namespace_allow_policy(name, namespace, ports);
    let created = gateway.create_network_policy(namespace, &policy).await?;

    debug!(namespace = %namespace, policy = %name, "Namespace-allow NetworkPolicy submitted");
    Ok(created)
}

/// Time left before `timeout` runs out, `None` once it has
fn time_left(start: Instant, timeout: Duration) -> Option<Duration> {
    timeout
        .checked_sub(start.elapsed())
        .filter(|left| !left.is_zero())
}

/// How one probe run ended
enum ProbeRun {
    Matched(String),
    Finished(String),
}

impl TestContext {
    /// Create a namespace-allow policy in this context's namespace and track it
    ///
    /// When `policy_settle` is configured, pauses that long afterwards.
    /// Prefer [`probe_until`](Self::probe_until) to wait for enforcement.
    ///
    /// # Example
    ///
    /// ```ignore
    /// ctx.create_network_policy_with_namespace_allow(&np, vec![network_policy_port(80, "TCP")])
    ///     .await?;
    /// ```
    pub async fn create_network_policy_with_namespace_allow(
        &self,
        name: &str,
        ports: Vec<NetworkPolicyPort>,
    ) -> Result<NetworkPolicy, ContextError> {
        Self::ensure_valid_name(name)?;
        let namespace = self.namespace();
        let desired = ports
            .iter()
            .filter_map(|p| p.port.as_ref())
            .map(|p| match p {
                IntOrString::Int(n) => n.to_string(),
                IntOrString::String(s) => s.clone(),
            })
            .collect::<Vec<_>>()
            .join(",");

        let policy = match create_network_policy_with_namespace_allow(
            self.gateway.as_ref(),
            namespace,
            name,
            ports,
        )
        .await
        {
            Ok(policy) => policy,
            Err(e) if e.is_already_exists() => {
                warn!(namespace = %namespace, policy = %name, "NetworkPolicy already exists, adopting it");
                self.gateway.get_network_policy(namespace, name).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.record(ResourceKind::NetworkPolicy, name, format!("allow ports {desired}"));
        info!(namespace = %namespace, policy = %name, ports = %desired, "NetworkPolicy created");

        let settle = self.config.policy_settle;
        if !settle.is_zero() {
            debug!(namespace = %namespace, settle = ?settle, "Pausing for policy propagation");
            tokio::time::sleep(settle).await;
        }

        Ok(policy)
    }

    /// Run a probe pod repeatedly until its output contains `expected`
    ///
    /// Each run deletes any previous pod of that name, submits the probe,
    /// and watches its output until it matches or the pod finishes. The
    /// probe pod is deleted before returning. Gives up with
    /// [`ContextError::WaitTimeout`] once `timeout` has elapsed.
    ///
    /// This waits on the effect of a network policy instead of sleeping for
    /// a fixed time.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let probe = [http_probe_container("curl-container", CLIENT_IMAGE, &service_ip)];
    /// helper.probe_until(&client, &probe, "HTTP Response Code: 200", Duration::from_secs(60))
    ///     .await?;
    /// ```
    pub async fn probe_until(
        &self,
        name: &str,
        containers: &[ContainerConfig],
        expected: &str,
        timeout: Duration,
    ) -> Result<String, ContextError> {
        let namespace = self.namespace();
        let interval = self.config.probe_interval;
        let start = Instant::now();
        let mut runs = 0u32;

        let last_output = loop {
            runs += 1;
            self.cleanup_resource(name, ResourceKind::Pod).await?;
            self.submit_pod(name, containers).await?;

            let remaining = timeout.saturating_sub(start.elapsed());
            let run = poll(Budget::deadline(remaining, interval), |_| async move {
                let output = self
                    .gateway
                    .pod_logs(namespace, name)
                    .await
                    .unwrap_or_default();
                if output.contains(expected) {
                    return Ok(Attempt::Done(ProbeRun::Matched(output)));
                }

                let pod = match self.gateway.get_pod(namespace, name).await {
                    Ok(pod) => pod,
                    Err(e) if e.is_not_found() => return Ok(Attempt::Retry(output)),
                    Err(e) => return Err(e),
                };
                let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                if phase == Some("Succeeded") || failure_reason(&pod).is_some() {
                    return Ok(Attempt::Done(ProbeRun::Finished(output)));
                }
                Ok::<_, GatewayError>(Attempt::Retry(output))
            })
            .await;

            match run {
                Ok(ProbeRun::Matched(output)) => {
                    self.cleanup_resource(name, ResourceKind::Pod).await?;
                    info!(
                        namespace = %namespace,
                        pod = %name,
                        runs = runs,
                        elapsed = ?start.elapsed(),
                        "Probe observed expected output"
                    );
                    return Ok(output);
                }
                Ok(ProbeRun::Finished(output)) => {
                    debug!(namespace = %namespace, pod = %name, run = runs, output = %output.trim_end(), "Probe finished without match");
                    let Some(left) = time_left(start, timeout) else {
                        break output;
                    };
                    tokio::time::sleep(interval.min(left)).await;
                }
                Err(PollError::Aborted(e)) => return Err(e.into()),
                Err(PollError::Exhausted(exhausted)) => break exhausted.last_state,
            }
        };

        self.cleanup_resource(name, ResourceKind::Pod).await?;
        Err(WaitError::new(
            format!("pod/{name}"),
            format!("output containing '{expected}'"),
            start.elapsed(),
        )
        .with_state(last_output)
        .with_timeout(timeout)
        .with_attempts(runs)
        .into())
    }
}
