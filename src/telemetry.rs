//! Logging setup
//!
//! Plain `tracing` output to stderr. A test harness has no use for an
//! exporter pipeline.
//!
//! # Example
//!
//! ```no_run
//! use ephemera::telemetry::init_logging;
//!
//! init_logging();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,kube=warn,hyper=warn";

/// Initialize logging with tracing-subscriber
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs the subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
