use super::types::ResourceKind;
use super::{wait_error, ContextError, TestContext};
use crate::eventually::{poll, Attempt, Budget, PollError};
use crate::fixtures::{test_pod, ContainerConfig};
use crate::gateway::GatewayError;
use crate::wait::ResourceState;
use k8s_openapi::api::core::v1::Pod;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

fn phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

/// Running with every container ready, or completed successfully
#[must_use]
pub fn is_pod_ready(pod: &Pod) -> bool {
    match phase(pod) {
        "Succeeded" => true,
        "Running" => pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .is_some_and(|statuses| !statuses.is_empty() && statuses.iter().all(|c| c.ready)),
        _ => false,
    }
}

/// Why a pod counts as failed, if it does
///
/// A pod has failed when its phase is `Failed`, a container terminated
/// with a non-zero exit code, or a container is in `CrashLoopBackOff`.
#[must_use]
pub fn failure_reason(pod: &Pod) -> Option<String> {
    if phase(pod) == "Failed" {
        return Some(pod.state_description());
    }

    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    statuses.iter().find_map(|c| {
        let state = c.state.as_ref()?;
        if let Some(terminated) = state.terminated.as_ref().filter(|t| t.exit_code != 0) {
            return Some(format!(
                "container {} exited with code {}",
                c.name, terminated.exit_code
            ));
        }
        state
            .waiting
            .as_ref()
            .filter(|w| w.reason.as_deref() == Some("CrashLoopBackOff"))
            .map(|_| format!("container {} in CrashLoopBackOff", c.name))
    })
}

impl TestContext {
    /// Submit a test pod and record it; an existing pod of that name is adopted
    pub(crate) async fn submit_pod(&self, name: &str, containers: &[ContainerConfig]) -> Result<(), ContextError> {
        Self::ensure_valid_name(name)?;
        let namespace = self.namespace();
        let pod = test_pod(name, namespace, containers);

        match self.gateway.create_pod(namespace, &pod).await {
            Ok(_) => {
                debug!(namespace = %namespace, pod = %name, "Pod submitted");
            }
            Err(e) if e.is_already_exists() => {
                warn!(namespace = %namespace, pod = %name, "Pod already exists, adopting it");
            }
            Err(e) => return Err(e.into()),
        }

        let images: Vec<&str> = containers.iter().map(|c| c.image.as_str()).collect();
        self.record(ResourceKind::Pod, name, images.join(","));
        Ok(())
    }

    /// Create a pod and wait for it to become ready
    ///
    /// Polls up to `retry_count` times, `pod_poll_interval` apart. Ready means
    /// `Running` with all containers ready, or `Succeeded`. A `Failed` pod
    /// ends the wait early. The pod is never deleted on failure; it stays for
    /// inspection until cleanup.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let containers = [ContainerConfig::new("test-container", "httpd:2.4")
    ///     .resources(resource_requirements("250m", "1000m", "1Gi", "1Gi"))];
    /// let pod = ctx.create_test_pod(&server, &containers, 3).await?;
    /// ```
    pub async fn create_test_pod(
        &self,
        name: &str,
        containers: &[ContainerConfig],
        retry_count: u32,
    ) -> Result<Pod, ContextError> {
        self.submit_pod(name, containers).await?;

        let namespace = self.namespace();
        let budget = Budget::attempts(retry_count, self.config.pod_poll_interval);

        let result = poll(budget, |attempt| async move {
            let pod = match self.gateway.get_pod(namespace, name).await {
                Ok(pod) => pod,
                Err(e) if e.is_not_found() => {
                    return Ok(Attempt::Retry("not found".to_string()));
                }
                Err(e) => return Err(e),
            };

            if is_pod_ready(&pod) {
                return Ok(Attempt::Done(Ok(pod)));
            }
            if phase(&pod) == "Failed" {
                return Ok(Attempt::Done(Err(pod.state_description())));
            }

            let state = pod.state_description();
            debug!(namespace = %namespace, pod = %name, attempt = attempt, state = %state, "Pod not ready yet");
            Ok::<_, GatewayError>(Attempt::Retry(state))
        })
        .await;

        match result {
            Ok(Ok(pod)) => {
                info!(namespace = %namespace, pod = %name, phase = %phase(&pod), "Pod ready");
                Ok(pod)
            }
            Ok(Err(state)) => Err(ContextError::PodFailed {
                name: name.to_string(),
                state,
            }),
            Err(PollError::Aborted(e)) => Err(e.into()),
            Err(PollError::Exhausted(exhausted)) => Err(wait_error(
                format!("pod/{name}"),
                "Running and ready",
                exhausted,
                None,
            )
            .into()),
        }
    }

    /// Create a pod that is expected not to become ready
    ///
    /// Succeeds as soon as the pod is observed failing (see
    /// [`failure_reason`]), or when `retry_count` polls pass without the pod
    /// becoming ready. Fails with [`ContextError::UnexpectedReadiness`] if the
    /// pod completes successfully, or is running and ready when the budget
    /// runs out.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Denied traffic: the probe never gets an answer
    /// helper.create_test_pod_expecting_failure(&client, &probe, 3).await?;
    /// helper.verify_pod_response(&client, "HTTP Response Code: 000", 3).await?;
    /// ```
    pub async fn create_test_pod_expecting_failure(
        &self,
        name: &str,
        containers: &[ContainerConfig],
        retry_count: u32,
    ) -> Result<(), ContextError> {
        self.submit_pod(name, containers).await?;

        let namespace = self.namespace();
        let budget = Budget::attempts(retry_count, self.config.pod_poll_interval);
        let last_ready = &AtomicBool::new(false);

        let result = poll(budget, |attempt| async move {
            let pod = match self.gateway.get_pod(namespace, name).await {
                Ok(pod) => pod,
                Err(e) if e.is_not_found() => {
                    return Ok(Attempt::Retry("not found".to_string()));
                }
                Err(e) => return Err(e),
            };

            if let Some(reason) = failure_reason(&pod) {
                return Ok(Attempt::Done(Ok(reason)));
            }
            if phase(&pod) == "Succeeded" {
                return Ok(Attempt::Done(Err(pod.state_description())));
            }

            last_ready.store(is_pod_ready(&pod), Ordering::Relaxed);
            let state = pod.state_description();
            debug!(namespace = %namespace, pod = %name, attempt = attempt, state = %state, "Pod has not failed yet");
            Ok::<_, GatewayError>(Attempt::Retry(state))
        })
        .await;

        match result {
            Ok(Ok(reason)) => {
                info!(namespace = %namespace, pod = %name, reason = %reason, "Pod failed as expected");
                Ok(())
            }
            Ok(Err(state)) => Err(ContextError::UnexpectedReadiness {
                name: name.to_string(),
                state,
            }),
            Err(PollError::Aborted(e)) => Err(e.into()),
            Err(PollError::Exhausted(exhausted)) => {
                if last_ready.load(Ordering::Relaxed) {
                    Err(ContextError::UnexpectedReadiness {
                        name: name.to_string(),
                        state: exhausted.last_state,
                    })
                } else {
                    info!(
                        namespace = %namespace,
                        pod = %name,
                        attempts = exhausted.attempts,
                        state = %exhausted.last_state,
                        "Pod never became ready, as expected"
                    );
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::memory_context;
    use crate::gateway::{ClusterGateway, InMemoryGateway};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn web() -> Vec<ContainerConfig> {
        vec![ContainerConfig::new("test-container", "httpd:2.4").port(80)]
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_test_pod_waits_for_ready() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.script_pod_phases("server", &["Pending", "Pending", "Running"]);

        let start = Instant::now();
        let pod = ctx.create_test_pod("server", &web(), 3).await.unwrap();

        assert!(is_pod_ready(&pod));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(ctx.managed()[0].reference(), "pod/server");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_test_pod_accepts_succeeded() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.script_pod_phases("job", &["Succeeded"]);

        ctx.create_test_pod("job", &web(), 1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_test_pod_times_out_and_keeps_pod() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.script_pod_phases("server", &["Pending"]);

        let err = ctx.create_test_pod("server", &web(), 3).await.unwrap_err();
        match err {
            ContextError::WaitTimeout(e) => {
                assert_eq!(e.resource, "pod/server");
                assert_eq!(e.attempts, 3);
                assert!(e.last_state.contains("Pending"));
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
        assert!(gateway.contains(ResourceKind::Pod, "core", "server"));
        assert_eq!(ctx.managed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_test_pod_fails_fast_on_failed_phase() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.script_pod_phases("server", &["Pending", "Failed"]);

        let start = Instant::now();
        let err = ctx.create_test_pod("server", &web(), 10).await.unwrap_err();
        assert!(matches!(err, ContextError::PodFailed { ref name, .. } if name == "server"));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_adopts_existing_pod() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway
            .create_pod("core", &test_pod("server", "core", &web()))
            .await
            .unwrap();

        ctx.create_test_pod("server", &web(), 3).await.unwrap();
        assert_eq!(ctx.managed().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_name() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        let err = ctx.create_test_pod("Bad_Name", &web(), 3).await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidName { .. }));
        assert!(ctx.managed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expecting_failure_ok_on_failed_pod() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "test-4");
        gateway.script_pod_phases("client", &["Pending", "Failed"]);

        ctx.create_test_pod_expecting_failure("client", &web(), 3)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expecting_failure_ok_on_crash_loop() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "test-4");
        gateway.script_pod_phases("client", &["CrashLoopBackOff"]);

        ctx.create_test_pod_expecting_failure("client", &web(), 3)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expecting_failure_ok_when_never_ready() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "test-4");
        gateway.script_pod_phases("client", &["Pending"]);

        ctx.create_test_pod_expecting_failure("client", &web(), 3)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expecting_failure_rejects_success() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "test-4");
        gateway.script_pod_phases("client", &["Pending", "Succeeded"]);

        let err = ctx
            .create_test_pod_expecting_failure("client", &web(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::UnexpectedReadiness { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expecting_failure_rejects_ready_at_exhaustion() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "test-4");
        gateway.script_pod_phases("client", &["Pending", "Running"]);

        let err = ctx
            .create_test_pod_expecting_failure("client", &web(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::UnexpectedReadiness { .. }));
    }

    #[test]
    fn test_failure_reason_on_plain_pod() {
        let pod = test_pod("p", "core", &web());
        assert!(failure_reason(&pod).is_none());
        assert!(!is_pod_ready(&pod));
    }
}
