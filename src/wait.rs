//! Rich wait errors
//!
//! Every bounded wait in the harness fails with a [`WaitError`] that names
//! the resource, the awaited condition, the last observed state and how much
//! of the budget was used.
//!
//! # Example
//!
//! ```ignore
//! match ctx.wait_for_service_ip("ephemera-lb-1a2b", timeout, interval).await {
//!     Err(ContextError::WaitTimeout(err)) => {
//!         println!("Resource: {}", err.resource);
//!         println!("Awaiting: {}", err.condition);
//!         println!("Last state: {}", err.last_state);
//!     }
//!     _ => {}
//! }
//! ```

use k8s_openapi::api::core::v1::{Pod, Service};
use std::fmt;
use std::time::Duration;

/// Rich error context for wait operations
#[derive(Debug, Clone)]
pub struct WaitError {
    /// Resource reference (e.g., "pod/ephemera-server-1a2b")
    pub resource: String,
    /// Condition that never became true
    pub condition: String,
    /// Description of the last observed state
    pub last_state: String,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The configured budget, when the wait was deadline-bounded
    pub timeout: Option<Duration>,
    /// Number of observations made
    pub attempts: u32,
}

impl WaitError {
    /// Create a new `WaitError`
    pub fn new(resource: impl Into<String>, condition: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            resource: resource.into(),
            condition: condition.into(),
            last_state: "unknown".to_string(),
            elapsed,
            timeout: None,
            attempts: 0,
        }
    }

    /// Set the last observed state
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }

    /// Record the configured timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record the number of observations
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {} ({})", self.resource, self.condition)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Attempts: {}", self.attempts)?;
        match self.timeout {
            Some(timeout) => {
                writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
                writeln!(f, "└─ Timeout: {timeout:?}")?;
            }
            None => writeln!(f, "└─ Elapsed: {:?}", self.elapsed)?,
        }
        Ok(())
    }
}

impl std::error::Error for WaitError {}

/// Human-readable description of a resource's current state
pub trait ResourceState {
    /// Get a human-readable description of the resource's current state
    fn state_description(&self) -> String;
}

impl ResourceState for Pod {
    fn state_description(&self) -> String {
        let phase = self
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");

        let containers = self
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref());

        match containers {
            Some(statuses) => {
                let total = statuses.len();
                let ready = statuses.iter().filter(|c| c.ready).count();

                let reasons: Vec<&str> = statuses
                    .iter()
                    .filter_map(|c| {
                        let state = c.state.as_ref()?;
                        state
                            .waiting
                            .as_ref()
                            .and_then(|w| w.reason.as_deref())
                            .or_else(|| state.terminated.as_ref().and_then(|t| t.reason.as_deref()))
                    })
                    .collect();

                if reasons.is_empty() {
                    format!("phase={phase}, containers {ready}/{total} ready")
                } else {
                    format!(
                        "phase={phase}, containers {ready}/{total} ready, reasons: {}",
                        reasons.join(", ")
                    )
                }
            }
            None => format!("phase={phase}, no container status"),
        }
    }
}

impl ResourceState for Service {
    fn state_description(&self) -> String {
        let spec = self.spec.as_ref();
        let service_type = spec
            .and_then(|s| s.type_.as_deref())
            .unwrap_or("ClusterIP");
        let ip = spec
            .and_then(|s| s.cluster_ip.as_deref())
            .filter(|ip| !ip.is_empty())
            .unwrap_or("<unassigned>");
        format!("type={service_type}, clusterIP={ip}")
    }
}
