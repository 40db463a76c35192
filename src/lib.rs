//! Ephemera - lifecycle engine for ephemeral Kubernetes test resources
//!
//! Ephemera provisions short-lived pods, services and network policies for
//! end-to-end tests, waits for the cluster to converge, checks what the
//! workloads observed, and tears everything down in a fixed order.
//!
//! Every wait is bounded by an attempt count or a deadline. Nothing is
//! deleted implicitly; teardown is an explicit call that always runs to the
//! end and reports what it could not remove.
//!
//! # Example
//!
//! ```no_run
//! use ephemera::fixtures::{http_probe_container, response_line};
//! use ephemera::TestContext;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ephemera::telemetry::init_logging();
//!
//!     let ctx = TestContext::setup("core").await?;
//!     let client = ctx.resource_name("client")?;
//!     let probe = [http_probe_container("curl", &ctx.config().client_image, "example.com")];
//!
//!     let result = async {
//!         ctx.create_test_pod(&client, &probe, 3).await?;
//!         ctx.verify_pod_response(&client, &response_line("200"), 3).await
//!     }
//!     .await;
//!
//!     let report = ctx.teardown_all().await;
//!     println!("{report}");
//!     result?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod eventually;
pub mod fixtures;
pub mod gateway;
pub mod scenarios;
pub mod telemetry;
pub mod wait;

// Re-export commonly used types
pub use config::{ConfigError, HarnessConfig};
pub use context::{ContextError, ManagedResource, ResourceKind, Scope, TestContext};
pub use diagnostics::TeardownReport;
pub use gateway::{ClusterGateway, GatewayError, InMemoryGateway, KubeGateway};
pub use wait::WaitError;
