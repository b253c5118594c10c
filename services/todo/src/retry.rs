//! Fixed-delay retry helper.
//!
//! Attempts run sequentially on the calling task. Every attempt and every
//! pause between attempts races the supplied cancellation token.

use crate::config::PublishConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Why a retried operation did not produce a value
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error only
    Exhausted { attempts: u32, error: E },
    /// The give-up predicate matched before attempts ran out
    Aborted { attempts: u32, error: E },
    /// The cancellation token fired
    Cancelled,
}

/// Retry `max_attempts` times with a constant pause in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    pub fn from_config(config: &PublishConfig) -> Self {
        Self::fixed(config.max_attempts, config.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, `give_up` returns true, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. On success the attempt count
    /// that produced the value is returned alongside it.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        give_up: P,
    ) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op(attempt) => result,
            };

            let error = match result {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => error,
            };

            if give_up(&error) {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .run(
                &CancellationToken::new(),
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err("transient")
                        } else {
                            Ok("done")
                        }
                    }
                },
                |_| false,
            )
            .await;

        assert!(matches!(result, Ok(("done", 3))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_when_exhausted() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        let result: Result<((), u32), _> = policy
            .run(
                &CancellationToken::new(),
                |attempt| async move { Err(format!("failure {attempt}")) },
                |_| false,
            )
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(error, "failure 3");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_give_up_predicate_stops_early() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(500));
        let calls = AtomicU32::new(0);

        let result: Result<((), u32), _> = policy
            .run(
                &CancellationToken::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal") }
                },
                |error| *error == "fatal",
            )
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Aborted { attempts: 1, error: "fatal" })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<((), u32), _> = policy
            .run(&cancel, |_| async { Err("down") }, |_| false)
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts(), 1);
    }
}
