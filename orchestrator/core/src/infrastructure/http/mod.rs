// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outbound HTTP
//!
//! Retrying request layer for outbound HTTP calls.
//!
//! - [`HttpRequest`]: replayable request recipe (method, URL, headers, query, JSON body)
//! - [`send_request`]: per-attempt timeout plus status- and error-based retries
//! - [`HttpResult`]: captured response, decoded against an expected status
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Adapter between domain calls and `reqwest`

pub mod client;
pub mod request;

pub use client::{send_request, HttpTransport, RequestRetryConfig};
pub use request::HttpRequest;

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::call_context::Interrupted;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build request '{name}': {message}")]
    Build { name: String, message: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    #[error("failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("failed with status code {status}{}", body_suffix(.body))]
    Status { status: u16, body: String },

    #[error("failed to decode response body for status {status}: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" [{body}]")
    }
}

impl HttpError {
    /// Status code carried by the error, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } | HttpError::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, HttpError::Interrupted(_))
    }
}

/// Fully read response of the final attempt.
#[derive(Debug, Clone)]
pub struct HttpResult {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpResult {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON when the status is `success`; any other
    /// status becomes [`HttpError::Status`] carrying the raw body.
    pub fn decode_json<T: DeserializeOwned>(&self, success: StatusCode) -> Result<T, HttpError> {
        if self.status != success {
            return Err(self.status_error());
        }
        serde_json::from_slice(&self.body).map_err(|source| HttpError::Decode {
            status: self.status.as_u16(),
            source,
        })
    }

    /// Fails with [`HttpError::Status`] unless the status is one of `accepted`.
    pub fn check_status(&self, accepted: &[StatusCode]) -> Result<(), HttpError> {
        if accepted.contains(&self.status) {
            Ok(())
        } else {
            Err(self.status_error())
        }
    }

    pub fn status_error(&self) -> HttpError {
        HttpError::Status {
            status: self.status.as_u16(),
            body: self.text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Project {
        name: String,
    }

    fn result(status: u16, body: &str) -> HttpResult {
        HttpResult::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.as_bytes().to_vec(),
        )
    }

    #[test]
    fn test_decode_json_success() {
        let project: Project = result(200, r#"{"name":"demo"}"#)
            .decode_json(StatusCode::OK)
            .unwrap();
        assert_eq!(project.name, "demo");
    }

    #[test]
    fn test_unexpected_status_carries_body() {
        let err = result(404, "project not found")
            .decode_json::<Project>(StatusCode::OK)
            .unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 404, ref body } if body == "project not found"));
        assert_eq!(err.to_string(), "failed with status code 404 [project not found]");
    }

    #[test]
    fn test_status_error_without_body() {
        let err = result(503, "").check_status(&[StatusCode::OK]).unwrap_err();
        assert_eq!(err.to_string(), "failed with status code 503");
    }

    #[test]
    fn test_decode_error_keeps_status_and_hides_body() {
        let err = result(200, "<html>secret token abc</html>")
            .decode_json::<Project>(StatusCode::OK)
            .unwrap_err();
        assert_eq!(err.status(), Some(200));
        assert!(matches!(err, HttpError::Decode { .. }));
        assert!(!err.to_string().contains("secret token"));
    }

    #[test]
    fn test_check_status_accepts_any_listed() {
        let ok = result(204, "");
        assert!(ok.check_status(&[StatusCode::OK, StatusCode::NO_CONTENT]).is_ok());
    }
}
