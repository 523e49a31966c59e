//! Backoff for remote calls that fail with "unavailable".
//!
//! Only [`ChainError::Unavailable`] is retried here. Every other error is
//! returned to the caller unchanged so it can be classified.

use std::future::Future;
use std::time::Duration;

use clobgate_types::{ChainResult, RetryConfig, constants};
use rand::Rng;

/// Apply ±[`constants::BACKOFF_JITTER`] to `delay`.
#[must_use]
pub fn jittered(delay: Duration) -> Duration {
    let spread = constants::BACKOFF_JITTER;
    let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
    delay.mul_f64(factor)
}

/// Run `call` until it succeeds, fails with a non-transport error, or
/// `retry.remote_max_attempts` is reached.
pub async fn with_remote_retry<T, F, Fut>(retry: &RetryConfig, what: &str, mut call: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Err(err) if err.is_unavailable() && attempt < retry.remote_max_attempts => {
                let delay = jittered(retry.backoff(attempt));
                tracing::warn!(
                    call = what,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Remote call unavailable, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use clobgate_types::ChainError;

    use super::*;

    fn config(max: u32) -> RetryConfig {
        RetryConfig {
            remote_max_attempts: max,
            backoff_base_ms: 10,
            backoff_max_ms: 40,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn jitter_stays_in_band() {
        for _ in 0..100 {
            let d = jittered(Duration::from_millis(1000)).as_millis();
            assert!((800..=1200).contains(&d), "{d}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_unavailable_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = with_remote_retry(&config(4), "blockhash", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ChainError::Unavailable("down".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: ChainResult<()> = with_remote_retry(&config(3), "status", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChainError::Unavailable("down".into()))
        })
        .await;
        assert!(out.unwrap_err().is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: ChainResult<()> = with_remote_retry(&config(5), "send", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ChainError::BlockhashExpired)
        })
        .await;
        assert_eq!(out, Err(ChainError::BlockhashExpired));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
