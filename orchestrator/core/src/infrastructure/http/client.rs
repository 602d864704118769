// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Retrying send loop for [`HttpRequest`]s.
//!
//! Each attempt builds a fresh request, runs it under its own timeout (the
//! configured attempt timeout, capped by whatever is left of the caller's
//! deadline), and reads the whole body. Transport failures and retryable
//! statuses go around again through the shared retry executor. When the budget
//! runs out on a retryable status, the last response is handed back as a
//! normal [`HttpResult`] so the caller can still inspect it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Request, Response, StatusCode};
use tracing::debug;

use super::{HttpError, HttpRequest, HttpResult};
use crate::domain::call_context::{CallContext, Interrupted};
use crate::domain::platform_config::HttpClientConfig;
use crate::domain::retry::{Backoff, RetryPolicy};
use crate::infrastructure::retry;
use crate::infrastructure::transient::{is_transient_http_error, is_transient_http_status};

/// Single-shot HTTP round trip.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, reqwest::Error>;
}

#[async_trait]
impl HttpTransport for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        reqwest::Client::execute(self, request).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestRetryConfig {
    /// Attempts beyond the first; `0` sends exactly once.
    pub max_retries: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
    pub attempt_timeout: Duration,
    /// Decides which response statuses are retried for a given method.
    pub retry_on_status: fn(&Method, StatusCode) -> bool,
}

impl Default for RequestRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(180),
            retry_on_status: is_transient_http_status,
        }
    }
}

impl From<&HttpClientConfig> for RequestRetryConfig {
    fn from(config: &HttpClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            wait_min: config.wait_min,
            wait_max: config.wait_max,
            attempt_timeout: config.attempt_timeout,
            ..Self::default()
        }
    }
}

impl RequestRetryConfig {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_wait(mut self, wait_min: Duration, wait_max: Duration) -> Self {
        self.wait_min = wait_min;
        self.wait_max = wait_max;
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    fn policy(&self) -> RetryPolicy<AttemptError> {
        RetryPolicy::new(
            self.max_retries,
            Backoff::exponential_capped(self.wait_min, self.wait_max),
            AttemptError::is_retryable,
        )
    }
}

/// Outcome of one attempt that did not produce a final response.
enum AttemptError {
    /// Complete response whose status asks for another try.
    RetryableStatus(HttpResult),
    Failed(HttpError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::RetryableStatus(_) => true,
            AttemptError::Failed(err) => is_transient_http_error(err),
        }
    }
}

impl From<Interrupted> for AttemptError {
    fn from(reason: Interrupted) -> Self {
        AttemptError::Failed(HttpError::Interrupted(reason))
    }
}

impl From<HttpError> for AttemptError {
    fn from(err: HttpError) -> Self {
        AttemptError::Failed(err)
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::RetryableStatus(result) => {
                write!(f, "retryable status {}", result.status().as_u16())
            }
            AttemptError::Failed(err) => err.fmt(f),
        }
    }
}

/// Sends `request`, retrying per `config`. See the module docs.
pub async fn send_request<T>(
    ctx: &CallContext,
    transport: &T,
    request: &HttpRequest,
    config: &RequestRetryConfig,
) -> Result<HttpResult, HttpError>
where
    T: HttpTransport + ?Sized,
{
    // Malformed requests fail before the first attempt
    request.build()?;

    let policy = config.policy();
    let outcome = retry::execute(ctx, request.name(), &policy, || {
        attempt(ctx, transport, request, config)
    })
    .await;

    match outcome {
        Ok(result) => Ok(result),
        Err(AttemptError::RetryableStatus(result)) => Ok(result),
        Err(AttemptError::Failed(err)) => Err(err),
    }
}

async fn attempt<T>(
    ctx: &CallContext,
    transport: &T,
    request: &HttpRequest,
    config: &RequestRetryConfig,
) -> Result<HttpResult, AttemptError>
where
    T: HttpTransport + ?Sized,
{
    let timeout = match ctx.remaining() {
        Some(remaining) => remaining.min(config.attempt_timeout),
        None => config.attempt_timeout,
    };
    let built = request.build()?;

    let round_trip = async {
        let response = transport.execute(built).await.map_err(HttpError::Transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(HttpError::ReadBody)?;
        Ok::<_, HttpError>(HttpResult::new(status, headers, body.to_vec()))
    };

    let result = tokio::select! {
        reason = ctx.done() => return Err(reason.into()),
        timed = tokio::time::timeout(timeout, round_trip) => match timed {
            Ok(result) => result?,
            Err(_) => {
                if let Some(reason) = ctx.interrupted() {
                    return Err(reason.into());
                }
                return Err(HttpError::AttemptTimeout(timeout).into());
            }
        },
    };

    if (config.retry_on_status)(request.method(), result.status()) {
        debug!(
            request = request.name(),
            status = result.status().as_u16(),
            "Retryable response status"
        );
        return Err(AttemptError::RetryableStatus(result));
    }
    Ok(result)
}
