use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Kinds of object a test context creates and cleans up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    Service,
    NetworkPolicy,
}

impl ResourceKind {
    /// Kubernetes kind name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Service => "Service",
            Self::NetworkPolicy => "NetworkPolicy",
        }
    }

    /// Teardown position: lower ranks are deleted first
    ///
    /// Workloads go before the services that front them, and policies go
    /// last so traffic rules outlive everything they govern.
    #[must_use]
    pub fn teardown_rank(&self) -> u8 {
        match self {
            Self::Pod => 0,
            Self::Service => 1,
            Self::NetworkPolicy => 2,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    /// Accepts kind names and kubectl aliases, case-insensitively:
    /// `pod`/`po`, `service`/`svc`, `networkPolicy`/`netpol`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pod" | "pods" | "po" => Ok(Self::Pod),
            "service" | "services" | "svc" => Ok(Self::Service),
            "networkpolicy" | "networkpolicies" | "netpol" => Ok(Self::NetworkPolicy),
            _ => Err(format!("unknown resource kind '{s}'")),
        }
    }
}

/// An object created through a test context
#[derive(Debug, Clone)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub created_at: Instant,
    /// Short description of what was asked for
    pub desired: String,
}

impl ManagedResource {
    pub(crate) fn new(kind: ResourceKind, name: &str, desired: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            created_at: Instant::now(),
            desired: desired.into(),
        }
    }

    /// `kind/name` reference
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}", self.kind.as_str().to_lowercase(), self.name)
    }
}

/// The namespace a context operates in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Namespace name
    pub namespace: String,
    /// Whether this context created the namespace (and may delete it)
    pub owned: bool,
    /// Random suffix shared by every name generated in this scope
    pub random_name: String,
}
