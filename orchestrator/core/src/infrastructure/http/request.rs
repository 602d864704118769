// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Outbound request description.
//!
//! An [`HttpRequest`] is an owned, reusable recipe: every retry attempt turns
//! it into a fresh `reqwest::Request`, so the body can be replayed.

use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Body, Method, Request, Url};
use serde::Serialize;

use super::HttpError;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    name: String,
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    build_error: Option<String>,
}

impl HttpRequest {
    /// `name` identifies the call in logs and errors, e.g. `"cp.GetProject"`.
    pub fn new(name: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            build_error: None,
        }
    }

    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, Method::GET, url)
    }

    pub fn post(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, Method::POST, url)
    }

    pub fn put(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, Method::PUT, url)
    }

    pub fn delete(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name, Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Serializes `body` as JSON. A serialization failure is remembered and
    /// reported by the first send, before any attempt is made.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.body = Some(bytes);
                self.headers
                    .push((CONTENT_TYPE.as_str().to_string(), "application/json".to_string()));
            }
            Err(e) => self.build_error = Some(format!("failed to encode JSON body: {e}")),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds a fresh request for one attempt.
    pub fn build(&self) -> Result<Request, HttpError> {
        if let Some(message) = &self.build_error {
            return Err(self.build_failure(message.clone()));
        }

        let mut url = Url::parse(&self.url)
            .map_err(|e| self.build_failure(format!("invalid URL '{}': {e}", self.url)))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }

        let mut request = Request::new(self.method.clone(), url);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| self.build_failure(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| self.build_failure(format!("invalid value for header '{name}': {e}")))?;
            request.headers_mut().insert(name, value);
        }
        if let Some(body) = &self.body {
            *request.body_mut() = Some(Body::from(body.clone()));
        }
        Ok(request)
    }

    fn build_failure(&self, message: String) -> HttpError {
        HttpError::Build {
            name: self.name.clone(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sets_query_headers_and_body() {
        let request = HttpRequest::post("create", "http://cp.local/api/v1/orgs/acme/builds")
            .query("dryRun", "false")
            .bearer_auth("secret")
            .json(&serde_json::json!({"componentName": "agent"}))
            .build()
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.url().as_str(),
            "http://cp.local/api/v1/orgs/acme/builds?dryRun=false"
        );
        assert_eq!(request.headers()["authorization"], "Bearer secret");
        assert_eq!(request.headers()["content-type"], "application/json");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"componentName":"agent"}"#);
    }

    #[test]
    fn test_each_build_is_independent() {
        let recipe = HttpRequest::put("update", "http://cp.local/w").json(&vec![1, 2, 3]);
        let first = recipe.build().unwrap();
        let second = recipe.build().unwrap();
        assert_eq!(
            first.body().and_then(|b| b.as_bytes()),
            second.body().and_then(|b| b.as_bytes())
        );
    }

    #[test]
    fn test_invalid_url_is_build_error() {
        let err = HttpRequest::get("bad", "not a url").build().unwrap_err();
        assert!(matches!(err, HttpError::Build { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_json_encoding_failure_is_deferred() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "non-string keys cannot be JSON object keys");
        let recipe = HttpRequest::post("encode", "http://cp.local/").json(&map);
        let err = recipe.build().unwrap_err();
        assert!(err.to_string().contains("failed to encode JSON body"));
    }
}
