//! Cross-namespace NetworkPolicy scenario, end to end
//!
//! Server pod and service live in `core`, the probe runs from `test-4`.
//! Traffic must be denied before the allow policy exists and admitted
//! after it, and teardown must leave nothing behind.

use ephemera::scenarios::{teardown_contexts, NamespaceAllowScenario, ScenarioNames};
use ephemera::{ContextError, HarnessConfig, InMemoryGateway, ResourceKind, TestContext};
use std::sync::Arc;
use std::time::Duration;

async fn contexts(gateway: &Arc<InMemoryGateway>) -> (TestContext, TestContext) {
    let core = TestContext::setup_with(gateway.clone(), "core", HarnessConfig::default())
        .await
        .expect("core scope");
    let helper = TestContext::setup_with(gateway.clone(), "test-4", HarnessConfig::default())
        .await
        .expect("helper scope");
    (core, helper)
}

fn assert_all_absent(
    gateway: &InMemoryGateway,
    core: &TestContext,
    helper: &TestContext,
    names: &ScenarioNames,
) {
    for (kind, name, in_server_scope) in names.resources() {
        let namespace = if in_server_scope {
            core.namespace()
        } else {
            helper.namespace()
        };
        assert!(
            !gateway.contains(kind, namespace, name),
            "{kind} {namespace}/{name} should be gone"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_deny_then_allow_across_namespaces() {
    ephemera::telemetry::init_logging();

    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_namespace("core")
            .policy_propagation(Duration::from_secs(10)),
    );
    let (core, helper) = contexts(&gateway).await;
    assert_ne!(core.random_name(), helper.random_name());

    let result = NamespaceAllowScenario::new(80).run(&core, &helper).await;
    let report = teardown_contexts(&[&helper, &core]).await;

    let names = result.expect("scenario should pass");
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.removed.len(), 4, "{report}");
    assert_all_absent(&gateway, &core, &helper, &names);

    // Teardown order: client pod, then server pod, service, policy
    let deletions: Vec<_> = gateway
        .deletions()
        .into_iter()
        .map(|(kind, _, _)| kind)
        .collect();
    let tail = &deletions[deletions.len() - 4..];
    assert_eq!(
        tail,
        [
            ResourceKind::Pod,
            ResourceKind::Pod,
            ResourceKind::Service,
            ResourceKind::NetworkPolicy
        ]
    );

    // The helper scope was created by its context and can be released
    assert!(helper.release_scope().await.unwrap());
    assert!(!core.release_scope().await.unwrap());
    assert!(gateway.has_namespace("core"));
    assert!(!gateway.has_namespace("test-4"));
}

#[tokio::test(start_paused = true)]
async fn test_unenforced_policy_fails_but_still_cleans_up() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_namespace("core")
            .with_namespace("test-4")
            .policy_propagation(Duration::from_secs(3600)),
    );
    let (core, helper) = contexts(&gateway).await;
    let names = ScenarioNames::for_context(&core).unwrap();

    let result = NamespaceAllowScenario::new(80)
        .propagation_timeout(Duration::from_secs(30))
        .run(&core, &helper)
        .await;
    assert!(matches!(result, Err(ContextError::WaitTimeout(_))));

    let report = teardown_contexts(&[&helper, &core]).await;
    assert!(report.is_clean(), "{report}");
    assert_all_absent(&gateway, &core, &helper, &names);
    assert_eq!(gateway.object_count("core"), 0);
    assert_eq!(gateway.object_count("test-4"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_open_cluster_fails_the_deny_step() {
    let gateway = Arc::new(
        InMemoryGateway::new()
            .with_namespace("core")
            .with_namespace("test-4")
            .allow_cross_namespace_by_default(),
    );
    let (core, helper) = contexts(&gateway).await;

    let result = NamespaceAllowScenario::new(80).run(&core, &helper).await;
    assert!(
        matches!(result, Err(ContextError::UnexpectedReadiness { .. })),
        "got {result:?}"
    );

    let report = teardown_contexts(&[&helper, &core]).await;
    assert!(report.is_clean(), "{report}");
    assert_eq!(gateway.object_count("core"), 0);
    assert_eq!(gateway.object_count("test-4"), 0);
}

/// Requires a cluster whose CNI enforces NetworkPolicy with default deny
/// across namespaces
#[tokio::test]
#[ignore]
async fn test_deny_then_allow_on_real_cluster() {
    ephemera::telemetry::init_logging();

    let core = TestContext::setup("core").await.expect("core scope");
    let helper = TestContext::setup("test-4").await.expect("helper scope");

    let result = NamespaceAllowScenario::new(80).run(&core, &helper).await;
    let report = teardown_contexts(&[&helper, &core]).await;
    helper.release_scope().await.expect("release helper scope");
    core.release_scope().await.expect("release core scope");

    result.expect("scenario should pass");
    assert!(report.is_clean(), "{report}");
}
