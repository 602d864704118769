// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Retry Executor
//!
//! One executor shared by every transport. It runs an async operation up to
//! `policy.max_attempts()` times, checks the [`CallContext`] before each
//! attempt, sleeps the policy's backoff between attempts (cancellably), and
//! stops early on failures the policy's classifier rejects.
//!
//! On exhaustion the caller gets the last real error back untouched. When the
//! context fires the caller gets [`Interrupted`] converted into its own error
//! type, never a stale operation error.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transport-agnostic retry loop
//! - **Used by:** control-plane façade, `RetryingPool`, `send_request`

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::domain::call_context::{CallContext, Interrupted};
use crate::domain::retry::RetryPolicy;

/// Result of a retried call plus how many times the operation actually ran.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts_made: u32,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn last_error(&self) -> Option<&E> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Runs `op` under `policy`, see the module docs for the exact contract.
pub async fn execute<T, E, F, Fut>(
    ctx: &CallContext,
    operation: &str,
    policy: &RetryPolicy<E>,
    op: F,
) -> Result<T, E>
where
    E: From<Interrupted> + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    execute_with_outcome(ctx, operation, policy, op)
        .await
        .into_result()
}

pub async fn execute_with_outcome<T, E, F, Fut>(
    ctx: &CallContext,
    operation: &str,
    policy: &RetryPolicy<E>,
    mut op: F,
) -> RetryOutcome<T, E>
where
    E: From<Interrupted> + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempts_made = 0u32;

    loop {
        if attempts_made > 0 {
            let backoff = policy.backoff.delay(attempts_made);
            info!(
                operation,
                attempt = attempts_made + 1,
                max_retries = policy.max_retries,
                backoff = ?backoff,
                "Retrying operation after backoff"
            );
            if let Err(reason) = ctx.sleep(backoff).await {
                warn!(operation, attempts = attempts_made, %reason, "Retry aborted during backoff");
                return RetryOutcome {
                    result: Err(reason.into()),
                    attempts_made,
                };
            }
        }

        if let Some(reason) = ctx.interrupted() {
            warn!(operation, attempts = attempts_made, %reason, "Operation interrupted before attempt");
            return RetryOutcome {
                result: Err(reason.into()),
                attempts_made,
            };
        }

        attempts_made += 1;
        let err = match op().await {
            Ok(value) => {
                if attempts_made > 1 {
                    info!(operation, attempts = attempts_made, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts_made,
                };
            }
            Err(err) => err,
        };

        if !policy.should_retry(&err) {
            debug!(operation, attempt = attempts_made, error = %err, "Non-retryable error");
            return RetryOutcome {
                result: Err(err),
                attempts_made,
            };
        }

        if attempts_made >= max_attempts {
            error!(
                operation,
                attempts = attempts_made,
                error = %err,
                "Operation failed after all retries"
            );
            return RetryOutcome {
                result: Err(err),
                attempts_made,
            };
        }

        warn!(
            operation,
            attempt = attempts_made,
            max_retries = policy.max_retries,
            error = %err,
            "Retryable error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::domain::retry::Backoff;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
        #[error(transparent)]
        Interrupted(#[from] Interrupted),
    }

    fn policy(max_retries: u32) -> RetryPolicy<TestError> {
        RetryPolicy::new(
            max_retries,
            Backoff::exponential(Duration::from_secs(1)),
            |e| matches!(e, TestError::Transient),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let outcome = execute_with_outcome(&CallContext::new(), "op", &policy(3), || async {
            Ok::<_, TestError>(7)
        })
        .await;

        assert_eq!(outcome.attempts_made, 1);
        assert!(outcome.succeeded());
        assert_eq!(outcome.result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = execute_with_outcome(&CallContext::new(), "op", &policy(3), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Transient)
            }
        })
        .await;

        assert_eq!(outcome.attempts_made, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.last_error(), Some(&TestError::Transient));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule_is_exponential() {
        let started = tokio::time::Instant::now();
        let _ = execute(&CallContext::new(), "op", &policy(3), || async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        // 1s + 2s + 4s between four attempts
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let outcome = execute_with_outcome(&CallContext::new(), "op", &policy(5), || async {
            Err::<(), _>(TestError::Fatal)
        })
        .await;

        assert_eq!(outcome.attempts_made, 1);
        assert_eq!(outcome.result, Err(TestError::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let outcome = execute_with_outcome(&CallContext::new(), "op", &policy(0), || async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        assert_eq!(outcome.attempts_made, 1);
        assert_eq!(outcome.result, Err(TestError::Transient));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let ctx = CallContext::new();
        ctx.cancel();

        let outcome = execute_with_outcome(&ctx, "op", &policy(3), || async {
            Ok::<_, TestError>(())
        })
        .await;

        assert_eq!(outcome.attempts_made, 0);
        assert_eq!(
            outcome.result,
            Err(TestError::Interrupted(Interrupted::Cancelled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_reports_cancellation() {
        let ctx = CallContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        });

        let outcome = execute_with_outcome(&ctx, "op", &policy(3), || async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        assert_eq!(outcome.attempts_made, 1);
        assert_eq!(
            outcome.result,
            Err(TestError::Interrupted(Interrupted::Cancelled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_spans_all_attempts() {
        let ctx = CallContext::with_timeout(Duration::from_millis(2500));

        let outcome = execute_with_outcome(&ctx, "op", &policy(5), || async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        // attempts at t=0 and t=1s; the 2s wait before the third overruns the deadline
        assert_eq!(outcome.attempts_made, 2);
        assert_eq!(
            outcome.result,
            Err(TestError::Interrupted(Interrupted::DeadlineExceeded))
        );
    }
}
