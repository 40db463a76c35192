use super::{ContextError, TestContext};
use crate::eventually::{poll, Attempt, Budget, PollError};
use std::convert::Infallible;
use tracing::{debug, info, warn};

impl TestContext {
    /// Check that a pod's output contains `expected`, retrying
    ///
    /// Reads the pod's logs up to `retry_count` times, `verify_interval`
    /// apart, and succeeds on the first read containing `expected`. A failed
    /// log read counts as empty output. Returns the matching output.
    ///
    /// # Example
    ///
    /// ```ignore
    /// helper.verify_pod_response(&client, "HTTP Response Code: 200", 3).await?;
    /// ```
    pub async fn verify_pod_response(
        &self,
        pod: &str,
        expected: &str,
        retry_count: u32,
    ) -> Result<String, ContextError> {
        let namespace = self.namespace();
        let budget = Budget::attempts(retry_count, self.config.verify_interval);

        let result = poll(budget, |attempt| async move {
            let output = match self.gateway.pod_logs(namespace, pod).await {
                Ok(output) => output,
                Err(e) => {
                    debug!(namespace = %namespace, pod = %pod, attempt = attempt, error = %e, "Log read failed");
                    String::new()
                }
            };

            if output.contains(expected) {
                return Ok(Attempt::Done(output));
            }
            debug!(namespace = %namespace, pod = %pod, attempt = attempt, "Expected output not seen yet");
            Ok::<_, Infallible>(Attempt::Retry(output))
        })
        .await;

        match result {
            Ok(output) => {
                info!(namespace = %namespace, pod = %pod, expected = %expected, "Pod response verified");
                Ok(output)
            }
            Err(PollError::Aborted(never)) => match never {},
            Err(PollError::Exhausted(exhausted)) => {
                warn!(
                    namespace = %namespace,
                    pod = %pod,
                    expected = %expected,
                    last_observed = %exhausted.last_state.trim_end(),
                    "Pod response did not match"
                );
                Err(ContextError::AssertionFailed {
                    resource: format!("pod/{pod}"),
                    expected: expected.to_string(),
                    attempts: exhausted.attempts,
                    last_observed: exhausted.last_state,
                })
            }
        }
    }
}
