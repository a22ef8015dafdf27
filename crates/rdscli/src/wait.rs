//! Resource waiting with backoff, deadlines and cancellation support.
//!
//! Provides a generic abstraction for waiting on AWS resources (or any async condition)
//! to become ready. Delays grow exponentially between `initial_delay` and `max_delay`;
//! setting both to the same value gives a fixed polling cadence.

use anyhow::Result;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for resource waiting.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Initial delay between checks
    pub initial_delay: Duration,
    /// Maximum delay between checks (cap for exponential growth)
    pub max_delay: Duration,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
    /// Add randomness to delays
    pub jitter: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl WaitConfig {
    /// Poll at a fixed interval without jitter
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            timeout,
            jitter: false,
        }
    }
}

/// Why a wait ended without the resource becoming ready
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("Timeout waiting for {resource} after {timeout:?} ({attempts} attempts)")]
    Timeout {
        resource: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("Wait for {resource} cancelled")]
    Cancelled { resource: String },
}

/// Wait for a resource to become ready.
///
/// The deadline is measured from the first attempt and is hard: a check
/// still running when it passes is dropped, and no check starts after it.
///
/// # Arguments
/// * `config` - Wait configuration
/// * `cancel` - Optional cancellation token
/// * `check` - Async function that returns `Ok(true)` when ready, `Ok(false)` to retry
/// * `resource_name` - Name for logging
///
/// # Returns
/// * `Ok(())` - Resource is ready
/// * `Err` - [`WaitError`] on timeout or cancellation, or the check's own error
pub async fn wait_for_resource<F, Fut>(
    config: WaitConfig,
    cancel: Option<&CancellationToken>,
    check: F,
    resource_name: &str,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut attempts = 0u32;
    let timed_out = |attempts| WaitError::Timeout {
        resource: resource_name.to_string(),
        timeout: config.timeout,
        attempts,
    };

    let mut builder = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0);
    if config.jitter {
        builder = builder.with_jitter();
    }
    let mut delays = builder.build();

    loop {
        // Check cancellation before each attempt
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(WaitError::Cancelled {
                    resource: resource_name.to_string(),
                }
                .into());
            }
        }

        if Instant::now() >= deadline {
            return Err(timed_out(attempts).into());
        }

        attempts += 1;

        let Ok(checked) = tokio::time::timeout_at(deadline, check()).await else {
            debug!(resource = %resource_name, attempts, "Deadline passed during check");
            return Err(timed_out(attempts).into());
        };

        match checked {
            Ok(true) => {
                debug!(resource = %resource_name, attempts, "Resource ready");
                return Ok(());
            }
            Ok(false) => {
                let delay = delays.next().unwrap_or(config.max_delay);
                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Resource not ready, retrying"
                );

                // Wait with cancellation support
                tokio::select! {
                    _ = tokio::time::sleep_until((Instant::now() + delay).min(deadline)) => {}
                    _ = async {
                        if let Some(token) = cancel {
                            token.cancelled().await
                        } else {
                            std::future::pending::<()>().await
                        }
                    } => {
                        return Err(WaitError::Cancelled {
                            resource: resource_name.to_string(),
                        }
                        .into());
                    }
                }
            }
            Err(e) => {
                warn!(resource = %resource_name, error = %e, "Resource check failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let calls = AtomicU32::new(0);
        wait_for_resource(
            WaitConfig::fixed(Duration::from_secs(1), Duration::from_secs(10)),
            None,
            || async { Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2) },
            "test",
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_cadence_times_out() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let err = wait_for_resource(
            WaitConfig::fixed(Duration::from_secs(1), Duration::from_secs(5)),
            None,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            },
            "never-ready",
        )
        .await
        .unwrap_err();

        match err.downcast_ref::<WaitError>() {
            Some(WaitError::Timeout { attempts, .. }) => assert_eq!(*attempts, 5),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_is_cut_off_at_deadline() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let err = wait_for_resource(
            WaitConfig::fixed(Duration::from_secs(1), Duration::from_secs(10)),
            None,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(6)).await;
                Ok(false)
            },
            "slow",
        )
        .await
        .unwrap_err();

        // Checks start at 0s and 7s; the second is still running at 10s
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err.downcast_ref::<WaitError>() {
            Some(WaitError::Timeout { attempts, .. }) => assert_eq!(*attempts, 2),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let err = wait_for_resource(
            WaitConfig::fixed(Duration::from_secs(1), Duration::from_secs(60)),
            None,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            },
            "broken",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let err = wait_for_resource(
            WaitConfig::default(),
            Some(&token),
            || async { Ok(false) },
            "cancelled",
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::Cancelled { .. })
        ));
    }
}
