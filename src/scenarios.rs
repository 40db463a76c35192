//! Multi-context scenarios
//!
//! Helpers that drive several [`TestContext`]s together: ordered teardown
//! across scopes, and the cross-namespace network-policy check (traffic from
//! another namespace is denied until an allow policy exists, then admitted).
//!
//! # Example
//!
//! ```ignore
//! use ephemera::scenarios::{teardown_contexts, NamespaceAllowScenario};
//! use ephemera::TestContext;
//!
//! let core = TestContext::setup("core").await?;
//! let helper = TestContext::setup("test-4").await?;
//!
//! let result = NamespaceAllowScenario::new(80).run(&core, &helper).await;
//! let report = teardown_contexts(&[&helper, &core]).await;
//!
//! result?;
//! assert!(report.is_clean(), "{report}");
//! ```

use crate::context::{ContextError, ResourceKind, TestContext};
use crate::diagnostics::TeardownReport;
use crate::fixtures::{
    http_probe_container, network_policy_port, resource_requirements, response_line,
    service_port, ContainerConfig, ServiceType,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Tear down several contexts in the given order and merge their reports
///
/// Pass dependents first (client scopes before server scopes). Every
/// context is torn down even when an earlier one reports failures.
pub async fn teardown_contexts(contexts: &[&TestContext]) -> TeardownReport {
    let mut report = TeardownReport::new();
    for ctx in contexts {
        report.merge(ctx.teardown_all().await);
    }
    report
}

/// Names used by one run of [`NamespaceAllowScenario`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioNames {
    pub server_pod: String,
    pub client_pod: String,
    pub service: String,
    pub policy: String,
}

impl ScenarioNames {
    /// Derive all names from the server context's random name
    pub fn for_context(ctx: &TestContext) -> Result<Self, ContextError> {
        Ok(Self {
            server_pod: ctx.resource_name("server")?,
            client_pod: ctx.resource_name("client")?,
            service: ctx.resource_name("lb")?,
            policy: ctx.resource_name("np")?,
        })
    }

    /// The four objects and the scope each lives in (`true` = server scope)
    #[must_use]
    pub fn resources(&self) -> [(ResourceKind, &str, bool); 4] {
        [
            (ResourceKind::Pod, self.client_pod.as_str(), false),
            (ResourceKind::Pod, self.server_pod.as_str(), true),
            (ResourceKind::Service, self.service.as_str(), true),
            (ResourceKind::NetworkPolicy, self.policy.as_str(), true),
        ]
    }
}

/// Deny-then-allow check for cross-namespace traffic on one port
///
/// 1. Server pod and ClusterIP service in the server scope
/// 2. Probe pod in the client scope is expected to get no answer (`000`)
/// 3. A namespace-allow policy on the port is added to the server scope
/// 4. Once the probe sees `200`, the probe pod is re-created and verified
#[derive(Debug, Clone)]
pub struct NamespaceAllowScenario {
    pub port: u16,
    pub retry_count: u32,
    pub service_ip_timeout: Duration,
    pub service_ip_poll: Duration,
    pub propagation_timeout: Duration,
}

impl NamespaceAllowScenario {
    /// Scenario on `port` with the usual budgets
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            retry_count: 3,
            service_ip_timeout: Duration::from_secs(120),
            service_ip_poll: Duration::from_secs(10),
            propagation_timeout: Duration::from_secs(60),
        }
    }

    /// Set the retry budget for pod waits and verification
    #[must_use]
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set how long to wait for the policy to take effect
    #[must_use]
    pub fn propagation_timeout(mut self, timeout: Duration) -> Self {
        self.propagation_timeout = timeout;
        self
    }

    fn target(&self, service_ip: &str) -> String {
        if self.port == 80 {
            service_ip.to_string()
        } else {
            format!("{service_ip}:{}", self.port)
        }
    }

    /// Run the scenario; teardown is left to the caller
    pub async fn run(
        &self,
        server: &TestContext,
        client: &TestContext,
    ) -> Result<ScenarioNames, ContextError> {
        let names = ScenarioNames::for_context(server)?;
        let retries = self.retry_count;

        let server_containers = [ContainerConfig::new("test-container", &server.config().server_image)
            .resources(resource_requirements("250m", "1000m", "1Gi", "1Gi"))
            .port(self.port)];
        server
            .create_test_pod(&names.server_pod, &server_containers, retries)
            .await?;

        let selector = BTreeMap::from([("app".to_string(), names.server_pod.clone())]);
        server
            .create_service(
                &names.service,
                ServiceType::ClusterIP,
                vec![service_port("http", self.port, self.port, "TCP")],
                Some(selector),
            )
            .await?;

        let service_ip = server
            .wait_for_service_ip(&names.service, self.service_ip_timeout, self.service_ip_poll)
            .await?;

        let probe = [http_probe_container(
            "curl-container",
            &client.config().client_image,
            &self.target(&service_ip),
        )];

        info!(
            server = %server.namespace(),
            client = %client.namespace(),
            port = self.port,
            "Expecting cross-namespace traffic to be denied"
        );
        client
            .create_test_pod_expecting_failure(&names.client_pod, &probe, retries)
            .await?;
        client
            .verify_pod_response(&names.client_pod, &response_line("000"), retries)
            .await?;
        client
            .cleanup_resource(&names.client_pod, ResourceKind::Pod)
            .await?;

        server
            .create_network_policy_with_namespace_allow(
                &names.policy,
                vec![network_policy_port(self.port, "TCP")],
            )
            .await?;

        client
            .probe_until(
                &names.client_pod,
                &probe,
                &response_line("200"),
                self.propagation_timeout,
            )
            .await?;

        info!(
            server = %server.namespace(),
            client = %client.namespace(),
            port = self.port,
            "Expecting cross-namespace traffic to be allowed"
        );
        client
            .create_test_pod(&names.client_pod, &probe, retries)
            .await?;
        client
            .verify_pod_response(&names.client_pod, &response_line("200"), retries)
            .await?;

        Ok(names)
    }
}
