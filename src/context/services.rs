use super::types::ResourceKind;
use super::{wait_error, ContextError, TestContext};
use crate::eventually::{poll, Attempt, Budget, PollError};
use crate::fixtures::{service, ServiceType};
use crate::gateway::GatewayError;
use crate::wait::ResourceState;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The assigned cluster IP, if any; headless services have none
fn cluster_ip(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.cluster_ip.as_deref())
        .filter(|ip| !ip.is_empty() && *ip != "None")
}

impl TestContext {
    /// Create a service; no waiting
    ///
    /// A `selector` of `None` selects `app=<name>`. Address assignment is
    /// awaited separately with [`wait_for_service_ip`](Self::wait_for_service_ip).
    ///
    /// # Example
    ///
    /// ```ignore
    /// let selector = BTreeMap::from([("app".to_string(), server.clone())]);
    /// ctx.create_service(&lb, ServiceType::ClusterIP,
    ///     vec![service_port("http", 80, 80, "TCP")], Some(selector)).await?;
    /// ```
    pub async fn create_service(
        &self,
        name: &str,
        service_type: ServiceType,
        ports: Vec<ServicePort>,
        selector: Option<BTreeMap<String, String>>,
    ) -> Result<Service, ContextError> {
        Self::ensure_valid_name(name)?;
        let namespace = self.namespace();
        let desired = service(name, namespace, service_type, ports, selector);

        let created = match self.gateway.create_service(namespace, &desired).await {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => {
                warn!(namespace = %namespace, service = %name, "Service already exists, adopting it");
                self.gateway.get_service(namespace, name).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.record(ResourceKind::Service, name, service_type.to_string());
        info!(namespace = %namespace, service = %name, service_type = %service_type, "Service created");
        Ok(created)
    }

    /// Wait until a service has a cluster IP and return it
    ///
    /// Polls every `poll_interval` and gives up once `timeout` has elapsed,
    /// never earlier. A service that is briefly not found counts as "not yet".
    ///
    /// # Example
    ///
    /// ```ignore
    /// let ip = ctx
    ///     .wait_for_service_ip(&lb, Duration::from_secs(120), Duration::from_secs(10))
    ///     .await?;
    /// ```
    pub async fn wait_for_service_ip(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<String, ContextError> {
        let namespace = self.namespace();
        let budget = Budget::deadline(timeout, poll_interval);

        debug!(namespace = %namespace, service = %name, timeout = ?timeout, "Waiting for cluster IP");

        let result = poll(budget, |_| async move {
            let svc = match self.gateway.get_service(namespace, name).await {
                Ok(svc) => svc,
                Err(e) if e.is_not_found() => {
                    return Ok(Attempt::Retry("not found".to_string()));
                }
                Err(e) => return Err(e),
            };

            Ok::<_, GatewayError>(match cluster_ip(&svc) {
                Some(ip) => Attempt::Done(ip.to_string()),
                None => Attempt::Retry(svc.state_description()),
            })
        })
        .await;

        match result {
            Ok(ip) => {
                info!(namespace = %namespace, service = %name, ip = %ip, "Service address assigned");
                Ok(ip)
            }
            Err(PollError::Aborted(e)) => Err(e.into()),
            Err(PollError::Exhausted(exhausted)) => Err(wait_error(
                format!("service/{name}"),
                "cluster IP assigned",
                exhausted,
                Some(timeout),
            )
            .into()),
        }
    }
}
