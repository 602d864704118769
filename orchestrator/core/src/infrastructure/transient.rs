// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transient Failure Classification
//!
//! Per-transport predicates deciding whether a failure is worth another
//! attempt, plus the default [`RetryPolicy`] values built from them.
//!
//! | Transport | Signal | Predicate |
//! |-----------|--------|-----------|
//! | Control plane | structured error, then message text | [`is_transient_control_plane_error`] |
//! | Outbound HTTP | method + status code, transport error kind | [`is_transient_http_status`], [`is_transient_http_error`] |
//! | Connection pool | message text only | [`is_transient_pool_error`] |
//!
//! Cancellation and deadline interrupts are never transient on any transport.

use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::domain::control_plane::ControlPlaneError;
use crate::domain::platform_config::{ControlPlaneRetryConfig, PoolRetryConfig};
use crate::domain::retry::{Backoff, RetryPolicy};
use crate::infrastructure::db::PoolError;
use crate::infrastructure::http::HttpError;

/// Lower-cased fragments of network-level failures worth retrying.
const TRANSIENT_CONTROL_PLANE_MESSAGES: &[&str] = &[
    "connection refused",
    "connection reset",
    "i/o timeout",
    "timed out",
    "deadline exceeded",
    "context deadline exceeded",
    "temporary failure",
    "network is unreachable",
    "no such host",
    "eof",
    "broken pipe",
    "client rate limiter",
];

/// Retryable statuses for methods that are safe to repeat.
const IDEMPOTENT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retryable statuses for everything else. A 500 may mean the write landed.
const NON_IDEMPOTENT_RETRY_STATUSES: [u16; 4] = [429, 502, 503, 504];

pub fn is_transient_control_plane_error(err: &ControlPlaneError) -> bool {
    match err {
        ControlPlaneError::Interrupted(_) => false,
        ControlPlaneError::Timeout(_)
        | ControlPlaneError::ServerTimeout(_)
        | ControlPlaneError::ServiceUnavailable(_)
        | ControlPlaneError::Internal(_)
        | ControlPlaneError::TooManyRequests(_)
        | ControlPlaneError::Conflict(_)
        | ControlPlaneError::UnexpectedServer { .. } => true,
        ControlPlaneError::Transport(message) => is_transient_control_plane_message(message),
        ControlPlaneError::NotFound { .. }
        | ControlPlaneError::AlreadyExists(_)
        | ControlPlaneError::Invalid(_)
        | ControlPlaneError::Forbidden(_)
        | ControlPlaneError::Decode(_) => false,
    }
}

pub fn is_transient_control_plane_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_CONTROL_PLANE_MESSAGES
        .iter()
        .any(|fragment| message.contains(fragment))
}

pub fn is_transient_http_status(method: &Method, status: StatusCode) -> bool {
    let status = status.as_u16();
    if *method == Method::GET || *method == Method::DELETE {
        IDEMPOTENT_RETRY_STATUSES.contains(&status)
    } else {
        NON_IDEMPOTENT_RETRY_STATUSES.contains(&status)
    }
}

/// Failures that happen before a usable response exists.
pub fn is_transient_http_error(err: &HttpError) -> bool {
    match err {
        HttpError::AttemptTimeout(_) | HttpError::ReadBody(_) => true,
        HttpError::Transport(source) => {
            source.is_connect() || source.is_timeout() || source.is_request() || source.is_body()
        }
        HttpError::Build { .. }
        | HttpError::Status { .. }
        | HttpError::Decode { .. }
        | HttpError::Interrupted(_) => false,
    }
}

pub fn is_transient_pool_error(err: &PoolError) -> bool {
    match err {
        PoolError::Interrupted(_) => false,
        PoolError::Database(source) => is_transient_pool_message(&source.to_string()),
    }
}

pub fn is_transient_pool_message(message: &str) -> bool {
    (message.contains("read tcp") && message.contains("i/o timeout"))
        || message.contains("timed out")
        || message.contains("is closed")
        || message.contains("failed to send RPC")
}

/// Three retries at 1s, 2s, 4s.
pub fn default_control_plane_policy() -> RetryPolicy<ControlPlaneError> {
    RetryPolicy::new(
        3,
        Backoff::exponential(Duration::from_secs(1)),
        is_transient_control_plane_error,
    )
}

pub fn control_plane_policy(config: &ControlPlaneRetryConfig) -> RetryPolicy<ControlPlaneError> {
    RetryPolicy::new(
        config.max_retries,
        config.backoff(),
        is_transient_control_plane_error,
    )
}

/// Three retries, 200ms apart.
pub fn default_pool_policy() -> RetryPolicy<PoolError> {
    RetryPolicy::new(
        3,
        Backoff::Fixed(Duration::from_millis(200)),
        is_transient_pool_error,
    )
}

pub fn pool_policy(config: &PoolRetryConfig) -> RetryPolicy<PoolError> {
    RetryPolicy::new(config.max_retries, config.backoff(), is_transient_pool_error)
}
