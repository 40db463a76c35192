//! Cluster gateways
//!
//! A [`ClusterGateway`] is the only thing a test context talks to. It is a
//! thin typed wrapper over the Kubernetes API that surfaces raw success or
//! failure and never retries. Two implementations ship with the crate:
//! - [`KubeGateway`]: a real cluster through `kube`
//! - [`InMemoryGateway`]: a simulated cluster for offline runs and tests

use crate::context::ResourceKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;

mod cluster;
mod memory;

pub use cluster::KubeGateway;
pub use memory::InMemoryGateway;

/// Errors surfaced by gateway calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} '{name}': permission denied (check RBAC)")]
    Forbidden { kind: String, name: String },

    #[error("cannot reach the Kubernetes API: {0}")]
    Unreachable(String),

    #[error("{kind} '{name}': API error {code}: {message}")]
    Api {
        kind: String,
        name: String,
        code: u16,
        message: String,
    },
}

impl GatewayError {
    pub(crate) fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// The object does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The object already exists
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Typed access to the objects a test context manages
///
/// Every call is a single request/response. Implementations must report
/// "not found" and "already exists" as the matching [`GatewayError`]
/// variants; the harness relies on them to keep create and delete
/// idempotent.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Fetch a namespace
    async fn get_namespace(&self, name: &str) -> Result<Namespace, GatewayError>;

    /// Create a namespace
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, GatewayError>;

    /// Delete a namespace
    async fn delete_namespace(&self, name: &str) -> Result<(), GatewayError>;

    /// Create a pod in `namespace`
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, GatewayError>;

    /// Fetch a pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError>;

    /// List pods, optionally filtered by a label selector such as `app=web`
    async fn list_pods(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<Pod>, GatewayError>;

    /// Full log output of a pod's first container
    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, GatewayError>;

    /// Create a service in `namespace`
    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, GatewayError>;

    /// Fetch a service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, GatewayError>;

    /// List services
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError>;

    /// Create a network policy in `namespace`
    async fn create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<NetworkPolicy, GatewayError>;

    /// Fetch a network policy
    async fn get_network_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicy, GatewayError>;

    /// List network policies
    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicy>, GatewayError>;

    /// Delete an object by kind and name
    ///
    /// Deletion may be asynchronous on the server; the object can still be
    /// readable for a while after this returns.
    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), GatewayError>;

    /// Whether an object currently exists
    async fn exists(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<bool, GatewayError> {
        let result = match kind {
            ResourceKind::Pod => self.get_pod(namespace, name).await.map(|_| ()),
            ResourceKind::Service => self.get_service(namespace, name).await.map(|_| ()),
            ResourceKind::NetworkPolicy => {
                self.get_network_policy(namespace, name).await.map(|_| ())
            }
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Gateway name for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let nf = GatewayError::not_found("Pod", "client");
        assert!(nf.is_not_found());
        assert!(!nf.is_already_exists());
        assert_eq!(nf.to_string(), "Pod 'client' not found");

        let ae = GatewayError::already_exists("Service", "lb");
        assert!(ae.is_already_exists());
        assert_eq!(ae.to_string(), "Service 'lb' already exists");
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Api {
            kind: "Pod".to_string(),
            name: "p".to_string(),
            code: 422,
            message: "invalid".to_string(),
        };
        assert_eq!(err.to_string(), "Pod 'p': API error 422: invalid");

        let err = GatewayError::Unreachable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_exists_default_method() {
        let gateway = InMemoryGateway::new().with_namespace("core");
        assert!(!gateway
            .exists(ResourceKind::Pod, "core", "missing")
            .await
            .unwrap());

        let pod = crate::fixtures::test_pod("web", "core", &[]);
        gateway.create_pod("core", &pod).await.unwrap();
        assert!(gateway.exists(ResourceKind::Pod, "core", "web").await.unwrap());
    }
}
