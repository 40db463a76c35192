use super::parsing::{compose_name, parse_resource_ref};
use super::types::{ManagedResource, ResourceKind, Scope};
use super::{wait_error, ContextError, TestContext};
use crate::config::{is_dns_label, HarnessConfig};
use crate::diagnostics::TeardownReport;
use crate::eventually::{poll, Attempt, Budget, PollError};
use crate::fixtures::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::gateway::{ClusterGateway, GatewayError, KubeGateway};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label put on namespaces a context creates
pub const TEST_NAMESPACE_LABEL: &str = "ephemera.io/test";

/// Length of the random suffix appended to generated names
const RANDOM_NAME_LEN: usize = 12;

fn random_suffix() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(RANDOM_NAME_LEN);
    id
}

fn test_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                (TEST_NAMESPACE_LABEL.to_string(), "true".to_string()),
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            ])),
            ..Default::default()
        },
        ..Default::default()
    }
}

impl TestContext {
    /// Set up a context for `scope` against the current kubeconfig cluster
    ///
    /// Configuration comes from [`HarnessConfig::from_env`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let core = TestContext::setup("core").await?;
    /// let helper = TestContext::setup("test-4").await?;
    /// assert_ne!(core.random_name(), helper.random_name());
    /// ```
    pub async fn setup(scope: &str) -> Result<Self, ContextError> {
        let config = HarnessConfig::from_env().map_err(|e| ContextError::Setup {
            namespace: scope.to_string(),
            reason: e.to_string(),
        })?;

        let gateway = KubeGateway::try_default()
            .await
            .map_err(|e| ContextError::Setup {
                namespace: scope.to_string(),
                reason: e.to_string(),
            })?;

        Self::setup_with(Arc::new(gateway), scope, config).await
    }

    /// Set up a context for `scope` over an explicit gateway
    ///
    /// Binds to the namespace when it exists and creates it otherwise. Only
    /// a namespace created here is deleted by [`release_scope`](Self::release_scope).
    pub async fn setup_with(
        gateway: Arc<dyn ClusterGateway>,
        scope: &str,
        config: HarnessConfig,
    ) -> Result<Self, ContextError> {
        if !is_dns_label(scope) {
            return Err(ContextError::InvalidName {
                name: scope.to_string(),
                reason: "namespace must be a DNS-1123 label".to_string(),
            });
        }

        let setup_failed = |e: GatewayError| ContextError::Setup {
            namespace: scope.to_string(),
            reason: e.to_string(),
        };

        let owned = match gateway.get_namespace(scope).await {
            Ok(_) => false,
            Err(e) if e.is_not_found() => match gateway.create_namespace(&test_namespace(scope)).await
            {
                Ok(_) => true,
                // Created concurrently by another context
                Err(e) if e.is_already_exists() => false,
                Err(e) => return Err(setup_failed(e)),
            },
            Err(e) => return Err(setup_failed(e)),
        };

        let scope = Scope {
            namespace: scope.to_string(),
            owned,
            random_name: random_suffix(),
        };

        info!(
            namespace = %scope.namespace,
            random_name = %scope.random_name,
            owned = scope.owned,
            gateway = gateway.name(),
            "Test context ready"
        );

        Ok(Self::from_parts(gateway, scope, config))
    }

    /// Scope-unique name for a role, `{prefix}-{role}-{random}`
    ///
    /// ```ignore
    /// let server = ctx.resource_name("server")?; // "ephemera-server-1a2b3c4d5e6f"
    /// ```
    pub fn resource_name(&self, role: &str) -> Result<String, ContextError> {
        let name = compose_name(&self.config.test_prefix, role, &self.scope.random_name);
        if is_dns_label(&name) {
            Ok(name)
        } else {
            Err(ContextError::InvalidName {
                name,
                reason: "must be at most 63 lowercase alphanumerics or '-'".to_string(),
            })
        }
    }

    /// Snapshot of the objects this context manages, in creation order
    #[must_use]
    pub fn managed(&self) -> Vec<ManagedResource> {
        self.ledger().clone()
    }

    pub(crate) fn ensure_valid_name(name: &str) -> Result<(), ContextError> {
        if is_dns_label(name) {
            Ok(())
        } else {
            Err(ContextError::InvalidName {
                name: name.to_string(),
                reason: "must be at most 63 lowercase alphanumerics or '-'".to_string(),
            })
        }
    }

    /// Record a created (or adopted) object; re-creating a name moves it
    /// to the end of the ledger
    pub(crate) fn record(&self, kind: ResourceKind, name: &str, desired: impl Into<String>) {
        let mut ledger = self.ledger();
        ledger.retain(|r| !(r.kind == kind && r.name == name));
        ledger.push(ManagedResource::new(kind, name, desired));
    }

    pub(crate) fn forget(&self, kind: ResourceKind, name: &str) {
        self.ledger().retain(|r| !(r.kind == kind && r.name == name));
    }

    /// Delete one object; an object that is already gone counts as deleted
    ///
    /// Pods are also awaited until they disappear (bounded by
    /// `deletion_timeout`) so the name can be reused right away.
    ///
    /// # Example
    ///
    /// ```ignore
    /// ctx.cleanup_resource(&client, ResourceKind::Pod).await?;
    /// ctx.cleanup_resource(&client, ResourceKind::Pod).await?; // still Ok
    /// ```
    pub async fn cleanup_resource(&self, name: &str, kind: ResourceKind) -> Result<(), ContextError> {
        let name = super::extract_resource_name(name);
        let namespace = self.namespace();

        match self.gateway.delete(kind, namespace, name).await {
            Ok(()) => {
                debug!(namespace = %namespace, kind = %kind, name = %name, "Deleted");
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace = %namespace, kind = %kind, name = %name, "Already absent");
            }
            Err(e) => {
                warn!(namespace = %namespace, kind = %kind, name = %name, error = %e, "Cleanup failed");
                return Err(e.into());
            }
        }

        if kind == ResourceKind::Pod {
            self.wait_for_pod_deleted(name, self.config.deletion_timeout)
                .await?;
        }

        self.forget(kind, name);
        Ok(())
    }

    /// [`cleanup_resource`](Self::cleanup_resource) from a `kind/name` reference
    pub async fn cleanup(&self, reference: &str) -> Result<(), ContextError> {
        let (kind, name) = parse_resource_ref(reference)?;
        self.cleanup_resource(name, kind).await
    }

    /// Wait until a pod no longer exists
    pub async fn wait_for_pod_deleted(&self, name: &str, timeout: Duration) -> Result<(), ContextError> {
        let namespace = self.namespace();
        let budget = Budget::deadline(timeout, self.config.probe_interval);

        let result = poll(budget, |_| async move {
            let exists = self
                .gateway
                .exists(ResourceKind::Pod, namespace, name)
                .await?;
            Ok::<_, GatewayError>(if exists {
                Attempt::Retry("still present".to_string())
            } else {
                Attempt::Done(())
            })
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::Aborted(e)) => Err(e.into()),
            Err(PollError::Exhausted(exhausted)) => Err(wait_error(
                format!("pod/{name}"),
                "deleted",
                exhausted,
                Some(timeout),
            )
            .into()),
        }
    }

    /// Delete everything this context created, in a fixed order
    ///
    /// Pods go first, then services, then network policies; within a kind
    /// the newest object goes first. Failures are logged and collected, and
    /// never stop the remaining deletions. Entries that failed stay in the
    /// ledger so a later call can retry them.
    pub async fn teardown_all(&self) -> TeardownReport {
        let mut plan: Vec<(usize, ManagedResource)> =
            self.ledger().iter().cloned().enumerate().collect();
        plan.sort_by_key(|(index, r)| (r.kind.teardown_rank(), std::cmp::Reverse(*index)));

        let namespace = self.namespace();
        let mut report = TeardownReport::new();

        info!(namespace = %namespace, resources = plan.len(), "Tearing down test context");

        for (_, resource) in plan {
            let reference = format!("{namespace}/{}", resource.reference());

            let deleted = match self.gateway.delete(resource.kind, namespace, &resource.name).await {
                Ok(()) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(ContextError::from(e)),
            };

            let outcome = match deleted {
                Ok(present) if resource.kind == ResourceKind::Pod => self
                    .wait_for_pod_deleted(&resource.name, self.config.deletion_timeout)
                    .await
                    .map(|()| present),
                other => other,
            };

            match outcome {
                Ok(true) => report.removed.push(reference),
                Ok(false) => report.already_absent.push(reference),
                Err(e) => {
                    warn!(namespace = %namespace, resource = %reference, error = %e, "Teardown step failed");
                    report.failed.push((reference, e.to_string()));
                    continue;
                }
            }
            self.forget(resource.kind, &resource.name);
        }

        if !report.is_clean() {
            warn!(namespace = %namespace, failed = report.failed.len(), "Teardown incomplete");
        }
        report
    }

    /// Delete the namespace if this context created it
    ///
    /// Returns whether a deletion was issued.
    pub async fn release_scope(&self) -> Result<bool, ContextError> {
        if !self.scope.owned {
            debug!(namespace = %self.namespace(), "Namespace not owned, leaving it in place");
            return Ok(false);
        }

        match self.gateway.delete_namespace(self.namespace()).await {
            Ok(()) => {
                info!(namespace = %self.namespace(), "Released namespace");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::memory_context;
    use crate::fixtures::test_pod;
    use crate::gateway::InMemoryGateway;

    async fn setup(gateway: &Arc<InMemoryGateway>, scope: &str) -> Result<TestContext, ContextError> {
        TestContext::setup_with(gateway.clone(), scope, HarnessConfig::default()).await
    }

    #[tokio::test]
    async fn test_setups_get_distinct_random_names() {
        let gateway = Arc::new(InMemoryGateway::new().with_namespace("core"));
        let a = setup(&gateway, "core").await.unwrap();
        let b = setup(&gateway, "core").await.unwrap();

        assert_ne!(a.random_name(), b.random_name());
        assert_eq!(a.random_name().len(), RANDOM_NAME_LEN);
    }

    #[tokio::test]
    async fn test_setup_creates_missing_namespace_and_owns_it() {
        let gateway = Arc::new(InMemoryGateway::new().with_namespace("core"));

        let existing = setup(&gateway, "core").await.unwrap();
        assert!(!existing.scope().owned);

        let created = setup(&gateway, "test-4").await.unwrap();
        assert!(created.scope().owned);
        assert!(gateway.has_namespace("test-4"));

        assert!(created.release_scope().await.unwrap());
        assert!(!gateway.has_namespace("test-4"));
        assert!(!existing.release_scope().await.unwrap());
        assert!(gateway.has_namespace("core"));
    }

    #[tokio::test]
    async fn test_setup_fails_fatally_when_unreachable() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.set_unreachable(true);

        let err = setup(&gateway, "core").await.unwrap_err();
        assert!(matches!(err, ContextError::Setup { ref namespace, .. } if namespace == "core"));
    }

    #[tokio::test]
    async fn test_setup_rejects_invalid_namespace() {
        let gateway = Arc::new(InMemoryGateway::new());
        let err = setup(&gateway, "Not_A_Namespace").await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidName { .. }));
    }

    #[tokio::test]
    async fn test_resource_names() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");

        assert_eq!(ctx.resource_name("server").unwrap(), "ephemera-server-1a2b3c4d5e6f");
        assert_eq!(ctx.resource_name("np").unwrap(), "ephemera-np-1a2b3c4d5e6f");

        let long_role = "x".repeat(60);
        assert!(matches!(
            ctx.resource_name(&long_role),
            Err(ContextError::InvalidName { .. })
        ));
        assert!(ctx.resource_name("Upper").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_resource_is_idempotent() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.create_pod("core", &test_pod("client", "core", &[])).await.unwrap();
        ctx.record(ResourceKind::Pod, "client", "probe");

        ctx.cleanup_resource("client", ResourceKind::Pod).await.unwrap();
        ctx.cleanup_resource("client", ResourceKind::Pod).await.unwrap();
        ctx.cleanup("service/never-created").await.unwrap();

        assert!(!gateway.contains(ResourceKind::Pod, "core", "client"));
        assert!(ctx.managed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_resource_waits_for_terminating_pod() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.create_pod("core", &test_pod("client", "core", &[])).await.unwrap();
        gateway.delay_pod_deletion("client", 3);
        ctx.record(ResourceKind::Pod, "client", "probe");

        let start = tokio::time::Instant::now();
        ctx.cleanup_resource("client", ResourceKind::Pod).await.unwrap();

        // Three reads still see the pod, each followed by a pause
        assert_eq!(start.elapsed(), ctx.config().probe_interval * 3);
        assert!(!gateway.contains(ResourceKind::Pod, "core", "client"));
        assert!(ctx.managed().is_empty());

        // The name is free again
        gateway.create_pod("core", &test_pod("client", "core", &[])).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pod_stuck_terminating_times_out() {
        let gateway = Arc::new(InMemoryGateway::new());
        let mut ctx = memory_context(&gateway, "core");
        ctx.config = ctx.config.clone().deletion_timeout(Duration::from_secs(5));
        gateway.create_pod("core", &test_pod("client", "core", &[])).await.unwrap();
        gateway.delay_pod_deletion("client", u32::MAX);
        ctx.record(ResourceKind::Pod, "client", "probe");

        let start = tokio::time::Instant::now();
        let err = ctx
            .cleanup_resource("client", ResourceKind::Pod)
            .await
            .unwrap_err();
        assert!(start.elapsed() >= Duration::from_secs(5));
        match err {
            ContextError::WaitTimeout(e) => {
                assert_eq!(e.resource, "pod/client");
                assert_eq!(e.last_state, "still present");
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
        assert_eq!(ctx.managed().len(), 1);

        let report = ctx.teardown_all().await;
        assert!(!report.is_clean());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "core/pod/client");
        assert_eq!(ctx.managed().len(), 1);
        assert_eq!(ctx.managed()[0].name, "client");
    }

    #[tokio::test]
    async fn test_cleanup_resource_surfaces_delete_errors() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.create_pod("core", &test_pod("client", "core", &[])).await.unwrap();
        gateway.fail_deletes_of("client");
        ctx.record(ResourceKind::Pod, "client", "probe");

        let err = ctx
            .cleanup_resource("client", ResourceKind::Pod)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Gateway(GatewayError::Api { code: 500, .. })));
        assert!(gateway.contains(ResourceKind::Pod, "core", "client"));
        assert_eq!(ctx.managed().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_bad_reference() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        assert!(matches!(
            ctx.cleanup("deployment/web").await,
            Err(ContextError::InvalidResourceRef(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_order_pods_services_policies() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");

        // Interleaved creation order
        ctx.record(ResourceKind::NetworkPolicy, "np", "");
        ctx.record(ResourceKind::Pod, "server", "");
        ctx.record(ResourceKind::Service, "lb", "");
        ctx.record(ResourceKind::Pod, "client", "");

        let report = ctx.teardown_all().await;

        // Nothing existed in the cluster, so every entry is already absent
        assert_eq!(
            report.already_absent,
            vec![
                "core/pod/client".to_string(),
                "core/pod/server".to_string(),
                "core/service/lb".to_string(),
                "core/networkpolicy/np".to_string(),
            ]
        );
        assert!(report.is_clean());
        assert!(ctx.managed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_continues_past_failures() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        gateway.create_pod("core", &test_pod("stuck", "core", &[])).await.unwrap();
        gateway.create_pod("core", &test_pod("fine", "core", &[])).await.unwrap();
        gateway.fail_deletes_of("stuck");
        ctx.record(ResourceKind::Pod, "stuck", "");
        ctx.record(ResourceKind::Pod, "fine", "");

        let report = ctx.teardown_all().await;

        assert_eq!(report.removed, vec!["core/pod/fine".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "core/pod/stuck");
        assert!(!report.is_clean());

        // Failed entries stay tracked for a retry
        let remaining = ctx.managed();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "stuck");
    }

    #[tokio::test]
    async fn test_record_moves_recreated_names_to_the_end() {
        let gateway = Arc::new(InMemoryGateway::new());
        let ctx = memory_context(&gateway, "core");
        ctx.record(ResourceKind::Pod, "a", "");
        ctx.record(ResourceKind::Pod, "b", "");
        ctx.record(ResourceKind::Pod, "a", "again");

        let names: Vec<_> = ctx.managed().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
