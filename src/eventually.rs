//! Budgeted polling
//!
//! Every wait in the harness is a poll loop bounded either by a number of
//! attempts or by a wall-clock deadline, with a fixed pause between
//! observations. [`poll`] is that loop.
//!
//! # Example
//!
//! ```ignore
//! use ephemera::eventually::{poll, Attempt, Budget};
//! use std::time::Duration;
//!
//! let ip = poll(Budget::deadline(Duration::from_secs(120), Duration::from_secs(10)), |_| async {
//!     let svc = gateway.get_service(ns, name).await?;
//!     Ok(match cluster_ip(&svc) {
//!         Some(ip) => Attempt::Done(ip),
//!         None => Attempt::Retry("no cluster IP".to_string()),
//!     })
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How long a poll loop may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// At most `count` observations, `interval` apart
    Attempts { count: u32, interval: Duration },
    /// Observe until `timeout` has elapsed, `interval` apart
    Deadline { timeout: Duration, interval: Duration },
}

impl Budget {
    /// Attempt-bounded budget. A count of zero still makes one observation.
    pub fn attempts(count: u32, interval: Duration) -> Self {
        Self::Attempts {
            count: count.max(1),
            interval,
        }
    }

    /// Deadline-bounded budget
    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        Self::Deadline { timeout, interval }
    }
}

/// Outcome of a single observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Condition met; stop polling
    Done(T),
    /// Not yet; the string describes what was observed
    Retry(String),
}

/// The budget ran out without the condition being met
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_state: String,
}

/// Why a poll loop stopped without a result
#[derive(Debug)]
pub enum PollError<E> {
    /// Budget exhausted
    Exhausted(Exhausted),
    /// The probe itself failed with a non-retryable error
    Aborted(E),
}

impl<E> From<E> for PollError<E> {
    fn from(err: E) -> Self {
        Self::Aborted(err)
    }
}

/// Run `probe` until it returns [`Attempt::Done`], an error, or the budget
/// is spent
///
/// The probe receives the 1-based attempt number. A deadline-bounded loop
/// never reports exhaustion before the deadline has passed; its final sleep
/// is shortened so it does not overshoot by more than one observation.
pub async fn poll<T, E, F, Fut>(budget: Budget, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let last_state = match probe(attempts).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(state) => state,
        };

        let elapsed = start.elapsed();
        let pause = match budget {
            Budget::Attempts { count, interval } => {
                if attempts >= count {
                    None
                } else {
                    Some(interval)
                }
            }
            Budget::Deadline { timeout, interval } => {
                if elapsed >= timeout {
                    None
                } else {
                    Some(interval.min(timeout - elapsed))
                }
            }
        };

        match pause {
            Some(pause) => sleep(pause).await,
            None => {
                return Err(PollError::Exhausted(Exhausted {
                    attempts,
                    elapsed,
                    last_state,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_succeeds_immediately() {
        let result: Result<u32, PollError<Infallible>> =
            poll(Budget::attempts(3, Duration::from_secs(1)), |n| async move {
                Ok(Attempt::Done(n))
            })
            .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: Result<&str, PollError<Infallible>> =
            poll(Budget::attempts(5, Duration::from_millis(10)), move |_| {
                let c = c.clone();
                async move {
                    let seen = c.fetch_add(1, Ordering::SeqCst);
                    Ok(if seen >= 2 {
                        Attempt::Done("ok")
                    } else {
                        Attempt::Retry(format!("seen {seen}"))
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhausts_with_last_state() {
        let start = Instant::now();
        let result: Result<(), PollError<Infallible>> =
            poll(Budget::attempts(3, Duration::from_secs(5)), |n| async move {
                Ok(Attempt::Retry(format!("attempt {n}")))
            })
            .await;

        match result {
            Err(PollError::Exhausted(e)) => {
                assert_eq!(e.attempts, 3);
                assert_eq!(e.last_state, "attempt 3");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        // Two pauses between three attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_observes_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let _: Result<(), PollError<Infallible>> =
            poll(Budget::attempts(0, Duration::from_secs(1)), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(Attempt::Retry(String::new())) }
            })
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_never_exhausts_early() {
        let timeout = Duration::from_secs(7);
        let start = Instant::now();
        let result: Result<(), PollError<Infallible>> =
            poll(Budget::deadline(timeout, Duration::from_secs(3)), |_| async {
                Ok(Attempt::Retry("pending".to_string()))
            })
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= timeout, "exhausted after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_secs(3));
        match result {
            Err(PollError::Exhausted(e)) => assert!(e.elapsed >= timeout),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_aborts() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result: Result<(), PollError<String>> =
            poll(Budget::attempts(5, Duration::from_secs(1)), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert!(matches!(result, Err(PollError::Aborted(ref e)) if e == "boom"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
