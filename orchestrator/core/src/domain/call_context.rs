// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Call Context
//!
//! Cancellation signal plus optional overall deadline carried by every call
//! that crosses a process boundary (control plane, relational store, outbound
//! HTTP). Retry loops consult it before each attempt and race it against their
//! backoff sleep, so a caller that goes away stops the work promptly.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Cooperative cancellation shared by all retried calls

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a call stopped before producing a result of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that never expires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Context bound to an externally owned token, e.g. a request's.
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Tightens the deadline; an earlier existing deadline is kept.
    pub fn timeout(self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline(candidate)
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Derived context: cancelled whenever `self` is, cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check of both signals. Cancellation wins over the deadline.
    pub fn interrupted(&self) -> Option<Interrupted> {
        if self.cancel.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        match self.interrupted() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interrupted {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Interrupted::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interrupted::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                Interrupted::Cancelled
            }
        }
    }

    /// Sleeps for `duration` unless the context fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_signal() {
        let ctx = CallContext::new();
        assert_eq!(ctx.sleep(Duration::from_secs(5)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let ctx = CallContext::new();
        let handle = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let started = Instant::now();
        let result = ctx.sleep(Duration::from_secs(60)).await;

        assert_eq!(result, Err(Interrupted::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(2));
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_tightens() {
        let ctx = CallContext::with_timeout(Duration::from_secs(1)).timeout(Duration::from_secs(30));
        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(1));
    }

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = CallContext::new();
        let child = parent.child();

        child.cancel();
        assert_eq!(parent.interrupted(), None);

        let second = parent.child();
        parent.cancel();
        assert_eq!(second.interrupted(), Some(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_takes_precedence_over_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(1));
        tokio::time::advance(Duration::from_millis(5)).await;
        ctx.cancel();
        assert_eq!(ctx.check(), Err(Interrupted::Cancelled));
    }
}
