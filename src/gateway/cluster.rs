use super::{ClusterGateway, GatewayError};
use crate::context::ResourceKind;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::Client;
use tracing::debug;

/// Gateway backed by a live cluster
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    /// Wrap an existing client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the default kubeconfig / in-cluster configuration
    pub async fn try_default() -> Result<Self, GatewayError> {
        let client = Client::try_default()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// The underlying client
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn create_in<K>(&self, namespace: &str, resource: &K) -> Result<K, GatewayError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + serde::Serialize
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let kind = K::kind(&Default::default()).to_string();
        let name = resource.meta().name.clone().unwrap_or_default();

        api.create(&PostParams::default(), resource)
            .await
            .map_err(|e| classify(e, &kind, &name))
    }

    async fn get_in<K>(&self, namespace: &str, name: &str) -> Result<K, GatewayError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let kind = K::kind(&Default::default()).to_string();

        api.get(name).await.map_err(|e| classify(e, &kind, name))
    }

    async fn list_in<K>(
        &self,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<K>, GatewayError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let kind = K::kind(&Default::default()).to_string();

        let list = api
            .list(params)
            .await
            .map_err(|e| classify(e, &kind, namespace))?;
        Ok(list.items)
    }

    async fn delete_in<K>(&self, namespace: &str, name: &str) -> Result<(), GatewayError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let kind = K::kind(&Default::default()).to_string();

        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, &kind, name))?;

        debug!(namespace = %namespace, kind = %kind, name = %name, "Delete accepted");
        Ok(())
    }
}

/// Sort a kube error into the gateway taxonomy
fn classify(err: kube::Error, kind: &str, name: &str) -> GatewayError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 => GatewayError::not_found(kind, name),
            409 if resp.reason == "AlreadyExists" => GatewayError::already_exists(kind, name),
            401 | 403 => GatewayError::Forbidden {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            code => GatewayError::Api {
                kind: kind.to_string(),
                name: name.to_string(),
                code,
                message: resp.message,
            },
        },
        kube::Error::HyperError(e) => GatewayError::Unreachable(e.to_string()),
        kube::Error::Service(e) => GatewayError::Unreachable(e.to_string()),
        other => GatewayError::Api {
            kind: kind.to_string(),
            name: name.to_string(),
            code: 0,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get_namespace(&self, name: &str) -> Result<Namespace, GatewayError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| classify(e, "Namespace", name))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, GatewayError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), namespace)
            .await
            .map_err(|e| classify(e, "Namespace", &name))
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), GatewayError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, "Namespace", name))?;
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, GatewayError> {
        self.create_in(namespace, pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, GatewayError> {
        self.get_in(namespace, name).await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<Pod>, GatewayError> {
        let params = match selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        self.list_in(namespace, &params).await
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<String, GatewayError> {
        // Multi-container pods need an explicit container
        let pod: Pod = self.get_in(namespace, name).await?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.logs(name, &first_container_logs(&pod))
            .await
            .map_err(|e| classify(e, "Pod", name))
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, GatewayError> {
        self.create_in(namespace, service).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, GatewayError> {
        self.get_in(namespace, name).await
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, GatewayError> {
        self.list_in(namespace, &ListParams::default()).await
    }

    async fn create_network_policy(
        &self,
        namespace: &str,
        policy: &NetworkPolicy,
    ) -> Result<NetworkPolicy, GatewayError> {
        self.create_in(namespace, policy).await
    }

    async fn get_network_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkPolicy, GatewayError> {
        self.get_in(namespace, name).await
    }

    async fn list_network_policies(
        &self,
        namespace: &str,
    ) -> Result<Vec<NetworkPolicy>, GatewayError> {
        self.list_in(namespace, &ListParams::default()).await
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), GatewayError> {
        match kind {
            ResourceKind::Pod => self.delete_in::<Pod>(namespace, name).await,
            ResourceKind::Service => self.delete_in::<Service>(namespace, name).await,
            ResourceKind::NetworkPolicy => {
                self.delete_in::<NetworkPolicy>(namespace, name).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "kube"
    }
}

/// Log parameters for the pod's first container
fn first_container_logs(pod: &Pod) -> LogParams {
    LogParams {
        container: pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("simulated {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_not_found() {
        let err = classify(api_error(404, "NotFound"), "Pod", "client");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Pod 'client' not found");
    }

    #[test]
    fn test_classify_already_exists() {
        let err = classify(api_error(409, "AlreadyExists"), "Service", "lb");
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_classify_conflict_is_not_already_exists() {
        let err = classify(api_error(409, "Conflict"), "Pod", "p");
        assert!(matches!(err, GatewayError::Api { code: 409, .. }));
    }

    #[test]
    fn test_classify_forbidden() {
        let err = classify(api_error(403, "Forbidden"), "NetworkPolicy", "np");
        assert!(matches!(err, GatewayError::Forbidden { .. }));
        assert!(err.to_string().contains("RBAC"));
    }

    #[test]
    fn test_classify_other_api_error() {
        let err = classify(api_error(422, "Invalid"), "Pod", "p");
        match err {
            GatewayError::Api { code, message, .. } => {
                assert_eq!(code, 422);
                assert!(message.contains("Invalid"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_logs_name_the_first_container() {
        let pod = crate::fixtures::test_pod(
            "web",
            "core",
            &[
                crate::fixtures::ContainerConfig::new("app", "httpd"),
                crate::fixtures::ContainerConfig::new("sidecar", "envoy"),
            ],
        );
        assert_eq!(first_container_logs(&pod).container.as_deref(), Some("app"));
        assert!(first_container_logs(&Pod::default()).container.is_none());
    }

    /// Requires a reachable cluster
    #[tokio::test]
    #[ignore]
    async fn test_kube_gateway_reads_default_namespace() {
        let gateway = KubeGateway::try_default().await.expect("cluster");
        let ns = gateway.get_namespace("default").await.expect("default ns");
        assert_eq!(ns.metadata.name.as_deref(), Some("default"));
    }
}
