//! Harness configuration
//!
//! Tunables for naming, polling cadence and probe images. Build them
//! programmatically, or start from the environment with
//! [`HarnessConfig::from_env`].
//!
//! # Example
//!
//! ```
//! use ephemera::config::HarnessConfig;
//! use std::time::Duration;
//!
//! let config = HarnessConfig::default()
//!     .test_prefix("netpol")
//!     .pod_poll_interval(Duration::from_secs(2))
//!     .verify_interval(Duration::from_secs(3));
//!
//! assert_eq!(config.test_prefix, "netpol");
//! ```

use std::time::Duration;

/// Default prefix shared by every resource a harness creates
pub const DEFAULT_TEST_PREFIX: &str = "ephemera";

/// Default image for server workloads
pub const DEFAULT_SERVER_IMAGE: &str = "httpd:2.4";

/// Default image for probe (client) workloads
pub const DEFAULT_CLIENT_IMAGE: &str = "curlimages/curl:8.10.1";

/// Errors from reading configuration overrides
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

/// Harness configuration shared by every [`TestContext`](crate::TestContext)
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    /// Fixed test-family prefix for resource names
    pub test_prefix: String,

    /// Delay between pod status polls during create-and-wait
    pub pod_poll_interval: Duration,

    /// Delay between attempts of `verify_pod_response`
    pub verify_interval: Duration,

    /// How long cleanup waits for a deleted pod to disappear
    pub deletion_timeout: Duration,

    /// Poll cadence for `probe_until` and deletion waits
    pub probe_interval: Duration,

    /// Optional fixed pause after submitting a network policy
    pub policy_settle: Duration,

    /// Image used for server workloads
    pub server_image: String,

    /// Image used for probe workloads
    pub client_image: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_prefix: DEFAULT_TEST_PREFIX.to_string(),
            pod_poll_interval: Duration::from_secs(5),
            verify_interval: Duration::from_secs(5),
            deletion_timeout: Duration::from_secs(60),
            probe_interval: Duration::from_secs(2),
            policy_settle: Duration::ZERO,
            server_image: DEFAULT_SERVER_IMAGE.to_string(),
            client_image: DEFAULT_CLIENT_IMAGE.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with `EPHEMERA_*` environment overrides applied
    ///
    /// Recognized variables:
    /// - `EPHEMERA_TEST_PREFIX`
    /// - `EPHEMERA_POD_POLL_SECS`
    /// - `EPHEMERA_VERIFY_INTERVAL_SECS`
    /// - `EPHEMERA_DELETION_TIMEOUT_SECS`
    /// - `EPHEMERA_SERVER_IMAGE`
    /// - `EPHEMERA_CLIENT_IMAGE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("EPHEMERA_TEST_PREFIX") {
            if !is_dns_label(&prefix) {
                return Err(ConfigError::InvalidValue {
                    var: "EPHEMERA_TEST_PREFIX".to_string(),
                    value: prefix,
                    reason: "must be lowercase alphanumerics and '-'".to_string(),
                });
            }
            self.test_prefix = prefix;
        }
        if let Some(secs) = lookup("EPHEMERA_POD_POLL_SECS") {
            self.pod_poll_interval = parse_secs("EPHEMERA_POD_POLL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("EPHEMERA_VERIFY_INTERVAL_SECS") {
            self.verify_interval = parse_secs("EPHEMERA_VERIFY_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("EPHEMERA_DELETION_TIMEOUT_SECS") {
            self.deletion_timeout = parse_secs("EPHEMERA_DELETION_TIMEOUT_SECS", &secs)?;
        }
        if let Some(image) = lookup("EPHEMERA_SERVER_IMAGE") {
            self.server_image = image;
        }
        if let Some(image) = lookup("EPHEMERA_CLIENT_IMAGE") {
            self.client_image = image;
        }
        Ok(self)
    }

    /// Set the resource name prefix
    #[must_use]
    pub fn test_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.test_prefix = prefix.into();
        self
    }

    /// Set the pod readiness poll interval
    #[must_use]
    pub fn pod_poll_interval(mut self, interval: Duration) -> Self {
        self.pod_poll_interval = interval;
        self
    }

    /// Set the delay between verification attempts
    #[must_use]
    pub fn verify_interval(mut self, interval: Duration) -> Self {
        self.verify_interval = interval;
        self
    }

    /// Set the deletion wait budget
    #[must_use]
    pub fn deletion_timeout(mut self, timeout: Duration) -> Self {
        self.deletion_timeout = timeout;
        self
    }

    /// Set the probe and deletion poll cadence
    #[must_use]
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set a fixed pause applied after each network policy submission
    #[must_use]
    pub fn policy_settle(mut self, settle: Duration) -> Self {
        self.policy_settle = settle;
        self
    }

    /// Set the server image
    #[must_use]
    pub fn server_image(mut self, image: impl Into<String>) -> Self {
        self.server_image = image.into();
        self
    }

    /// Set the client (probe) image
    #[must_use]
    pub fn client_image(mut self, image: impl Into<String>) -> Self {
        self.client_image = image.into();
        self
    }
}

fn parse_secs(var: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Check that a string is a valid RFC 1123 DNS label
pub(crate) fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}
