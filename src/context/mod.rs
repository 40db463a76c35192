//! Test context
//!
//! A [`TestContext`] binds one scope (namespace) to a [`ClusterGateway`] and
//! owns everything created through it. It generates scope-unique names,
//! creates workloads and waits for them, reads back what they observed, and
//! tears them down in a fixed order.
//!
//! # Errors
//!
//! All fallible methods return [`ContextError`]:
//! - setup failures (gateway unreachable, namespace unusable) are fatal
//! - wait budgets running out surface as [`ContextError::WaitTimeout`]
//! - verification mismatches surface as [`ContextError::AssertionFailed`]
//! - raw gateway failures pass through as [`ContextError::Gateway`]

#![allow(clippy::missing_errors_doc)]

mod lifecycle;
mod network;
mod parsing;
mod pods;
mod services;
pub mod types;
mod verify;

pub use network::create_network_policy_with_namespace_allow;
pub use parsing::{extract_resource_name, parse_kind, parse_resource_ref};
pub use pods::{failure_reason, is_pod_ready};
pub use types::{ManagedResource, ResourceKind, Scope};

use crate::config::HarnessConfig;
use crate::eventually::Exhausted;
use crate::gateway::{ClusterGateway, GatewayError};
use crate::wait::WaitError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Per-scope session over a cluster gateway
///
/// Operations are sequential: each `async` method completes its cluster
/// calls before returning, and later steps rely on earlier ones. Separate
/// contexts (one per scope) can run concurrently.
///
/// Nothing is deleted implicitly. Call [`teardown_all`](Self::teardown_all)
/// and, for namespaces this context created,
/// [`release_scope`](Self::release_scope).
///
/// # Example
///
/// ```ignore
/// use ephemera::fixtures::{ContainerConfig, ServiceType, service_port};
/// use ephemera::TestContext;
///
/// let ctx = TestContext::setup("core").await?;
/// let server = ctx.resource_name("server")?;
///
/// ctx.create_test_pod(&server, &[ContainerConfig::new("web", "httpd:2.4")], 3).await?;
/// ctx.create_service(&ctx.resource_name("lb")?, ServiceType::ClusterIP,
///     vec![service_port("http", 80, 80, "TCP")], None).await?;
///
/// let report = ctx.teardown_all().await;
/// assert!(report.is_clean());
/// ```
pub struct TestContext {
    gateway: Arc<dyn ClusterGateway>,
    scope: Scope,
    config: HarnessConfig,
    ledger: Mutex<Vec<ManagedResource>>,
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("gateway", &self.gateway.name())
            .field("scope", &self.scope)
            .field("managed", &self.ledger().len())
            .finish_non_exhaustive()
    }
}

/// Errors from test context operations
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Failed to set up scope '{namespace}': {reason}")]
    Setup { namespace: String, reason: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    WaitTimeout(#[from] WaitError),

    #[error("Pod '{name}' failed: {state}")]
    PodFailed { name: String, state: String },

    #[error("Pod '{name}' was expected to fail but became ready: {state}")]
    UnexpectedReadiness { name: String, state: String },

    #[error(
        "Assertion failed for {resource}: no output containing '{expected}' after {attempts} attempt(s); last observed: '{last_observed}'"
    )]
    AssertionFailed {
        resource: String,
        expected: String,
        attempts: u32,
        last_observed: String,
    },

    #[error("Invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid resource reference: {0}")]
    InvalidResourceRef(String),
}

impl TestContext {
    fn from_parts(gateway: Arc<dyn ClusterGateway>, scope: Scope, config: HarnessConfig) -> Self {
        Self {
            gateway,
            scope,
            config,
            ledger: Mutex::new(Vec::new()),
        }
    }

    /// Namespace this context operates in
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.scope.namespace
    }

    /// Random suffix of every name this context generates
    #[must_use]
    pub fn random_name(&self) -> &str {
        &self.scope.random_name
    }

    /// The scope this context is bound to
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Harness configuration in effect
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Gateway handle, for calls the context does not wrap
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn ClusterGateway> {
        &self.gateway
    }

    fn ledger(&self) -> MutexGuard<'_, Vec<ManagedResource>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turn an exhausted poll into a wait error for `resource`
pub(crate) fn wait_error(
    resource: String,
    condition: &str,
    exhausted: Exhausted,
    timeout: Option<Duration>,
) -> WaitError {
    let err = WaitError::new(resource, condition, exhausted.elapsed)
        .with_state(exhausted.last_state)
        .with_attempts(exhausted.attempts);
    match timeout {
        Some(timeout) => err.with_timeout(timeout),
        None => err,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Scope, TestContext};
    use crate::config::HarnessConfig;
    use crate::gateway::InMemoryGateway;
    use std::sync::Arc;

    /// Context over an in-memory cluster, bound to an existing namespace
    pub(crate) fn memory_context(gateway: &Arc<InMemoryGateway>, namespace: &str) -> TestContext {
        gateway.add_namespace(namespace);
        TestContext::from_parts(
            gateway.clone(),
            Scope {
                namespace: namespace.to_string(),
                owned: false,
                random_name: "1a2b3c4d5e6f".to_string(),
            },
            HarnessConfig::default(),
        )
    }
}
