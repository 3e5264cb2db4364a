//! Bounded retry and polling parameters.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Poll something at a fixed interval until it succeeds or a timeout elapses.
///
/// The interval is fixed rather than exponential: the expected wait windows
/// are seconds to tens of seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time allowed.
    pub timeout: Duration,

    /// Pause between consecutive polls.
    pub interval: Duration,
}

/// Outcome of [`PollPolicy::poll`].
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    /// The probe succeeded.
    Ready {
        /// Value produced by the successful probe.
        value: T,
        /// Number of probes made, including the successful one.
        attempts: u32,
    },

    /// The timeout elapsed first.
    TimedOut {
        /// Number of probes made.
        attempts: u32,
        /// Time spent polling.
        waited: Duration,
    },
}

impl PollPolicy {
    /// Creates a new poll policy.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Runs `probe` until it succeeds or the timeout elapses.
    ///
    /// Each probe is itself bounded by the time remaining, so a hanging probe
    /// cannot stretch the overall wait. `on_failure` sees every failed probe.
    pub async fn poll<T, E, F, Fut>(
        &self,
        mut probe: F,
        mut on_failure: impl FnMut(u32, &E),
    ) -> Polled<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts = 0;

        loop {
            attempts += 1;

            match tokio::time::timeout_at(deadline, probe()).await {
                Ok(Ok(value)) => return Polled::Ready { value, attempts },
                Ok(Err(e)) => on_failure(attempts, &e),
                Err(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Polled::TimedOut {
                    attempts,
                    waited: now - started,
                };
            }

            tokio::time::sleep_until((now + self.interval).min(deadline)).await;
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(1))
    }
}

/// Retry an operation a bounded number of times with a fixed backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,

    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Runs `operation` until it succeeds, fails with an error `retryable`
    /// rejects, or the attempts are used up.
    ///
    /// Returns the last result together with the number of attempts made.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        retryable: impl Fn(&E) -> bool,
    ) -> (Result<T, E>, u32)
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < max_attempts && retryable(&e) => {
                    debug!(
                        "attempt {}/{} failed, retrying in {:?}: {}",
                        attempt, max_attempts, self.backoff, e
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}
