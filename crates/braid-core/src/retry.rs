//! Retry with Capped Exponential Backoff
//!
//! Downstream calls (embedder, vector store) retry transient failures with
//! base 100ms, factor 2, at most 5 attempts, and jitter. After exhaustion
//! the last `unavailable` error surfaces to the caller.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::deadline::{self, Deadline};
use crate::error::Result;

/// Backoff policy for transient downstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// First delay between attempts.
    pub base: Duration,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            factor: 2,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), with up to 25% jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        let base = self.base.saturating_mul(exp);
        // Jitter from the clock's sub-millisecond noise; no RNG dependency.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let jitter_num = u64::from(nanos % 250); // 0..25% in 0.1% steps
        let jitter = base.mul_f64(jitter_num as f64 / 1000.0);
        base + jitter
    }
}

/// Run `op`, retrying transient (`retriable`) failures per `policy`.
///
/// Stops early when the deadline would expire before the next attempt and
/// returns the last error observed.
pub async fn with_backoff<T, F, Fut>(
    op_name: &str,
    policy: RetryPolicy,
    deadline: Option<Deadline>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        deadline::check(deadline)?;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retriable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                if let Some(d) = deadline {
                    match d.remaining() {
                        Some(left) if left > delay => {}
                        _ => return Err(err),
                    }
                }
                warn!(op = op_name, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { base: Duration::from_millis(1), factor: 1, max_attempts: 5 }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let out = with_backoff("op", fast_policy(), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, MemoryError>(7) }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let out = with_backoff("op", fast_policy(), None, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MemoryError::Unavailable("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_backoff("op", fast_policy(), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(MemoryError::Unavailable("down".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let err = with_backoff("op", fast_policy(), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(MemoryError::InvalidArgument("bad".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
