// =============================================================================
// Bounded retry with linear backoff
// =============================================================================
//
// One initial attempt plus up to `max_retries` retries. Before retry `n`
// (1-based) the caller sleeps `base_delay * n`. Only the sleeps observe the
// cancellation token; a cancelled sleep ends the retry loop immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub enum RetryError {
    /// Every attempt failed; holds the last error.
    Exhausted { attempts: u32, last: anyhow::Error },
    Cancelled,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Run `op` until it succeeds, retries run out, or `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        symbol: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry >= self.max_retries => {
                    return Err(RetryError::Exhausted {
                        attempts: retry + 1,
                        last: e,
                    });
                }
                Err(e) => {
                    retry += 1;
                    let delay = self.backoff(retry);
                    warn!(
                        symbol,
                        what,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{e:#}"),
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures() {
        let calls = &AtomicU32::new(0);
        let start = Instant::now();
        let out = RetryPolicy::default()
            .run("fetch", "sz000001", &CancellationToken::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("flaky")
                }
                Ok(7)
            })
            .await;
        assert!(matches!(out, Ok(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), _> = RetryPolicy::default()
            .run("persist", "sz000001", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("disk full")
            })
            .await;
        match out {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.to_string().contains("disk full"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let out: Result<(), _> = RetryPolicy::default()
            .run("fetch", "sz000001", &cancel, || {
                cancel.cancel();
                async { anyhow::bail!("boom") }
            })
            .await;
        assert!(matches!(out, Err(RetryError::Cancelled)));
    }
}
