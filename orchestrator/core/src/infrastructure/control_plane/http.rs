// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! REST adapter for the control plane.
//!
//! Every call is a single HTTP attempt (HTTP-level retries are disabled) so
//! that the façade's control-plane policy alone owns the retry budget. Response
//! statuses are mapped onto structured [`ControlPlaneError`] variants for the
//! control-plane classifier.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::call_context::CallContext;
use crate::domain::control_plane::{
    Build, BuildRequest, Component, ControlPlaneClient, ControlPlaneError, DeploymentPipeline,
    Environment, Project, Release, ReleaseBinding, Workload,
};
use crate::domain::platform_config::{ControlPlaneConfig, HttpClientConfig};
use crate::infrastructure::http::{send_request, HttpError, HttpRequest, HttpResult, HttpTransport, RequestRetryConfig};

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

pub struct HttpControlPlaneClient {
    base_url: String,
    token: Option<String>,
    transport: Arc<dyn HttpTransport>,
    request_config: RequestRetryConfig,
}

impl HttpControlPlaneClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            transport,
            request_config: RequestRetryConfig::no_retries(),
        }
    }

    pub fn from_config(
        config: &ControlPlaneConfig,
        http: &HttpClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let mut client = Self::new(config.url.clone(), transport);
        client.token = config.token.clone();
        client.request_config = RequestRetryConfig::no_retries().with_attempt_timeout(http.attempt_timeout);
        client
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn org_url(&self, org: &str, path: &str) -> String {
        format!("{}/api/v1/orgs/{}/{}", self.base_url, org, path)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, ctx: &CallContext, request: HttpRequest) -> Result<HttpResult, ControlPlaneError> {
        let request = self.authorize(request);
        send_request(ctx, self.transport.as_ref(), &request, &self.request_config)
            .await
            .map_err(map_http_error)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: HttpRequest,
        success: StatusCode,
        kind: &'static str,
        name: &str,
    ) -> Result<T, ControlPlaneError> {
        let method = request.method().clone();
        let result = self.send(ctx, request).await?;
        if result.status() != success {
            return Err(map_response_status(&method, result.status(), &result.text(), kind, name));
        }
        result.decode_json(success).map_err(map_http_error)
    }

    /// DELETE with no response body. A missing resource surfaces as
    /// `NotFound` so callers can decide whether that counts as done.
    async fn remove(
        &self,
        ctx: &CallContext,
        request: HttpRequest,
        kind: &'static str,
        name: &str,
    ) -> Result<(), ControlPlaneError> {
        let method = request.method().clone();
        let result = self.send(ctx, request).await?;
        match result.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            status => Err(map_response_status(&method, status, &result.text(), kind, name)),
        }
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: HttpRequest,
        kind: &'static str,
    ) -> Result<Vec<T>, ControlPlaneError> {
        let list: ListResponse<T> = self.fetch(ctx, request, StatusCode::OK, kind, "").await?;
        Ok(list.items)
    }
}

/// Joins an error with its source chain; the interesting part of a transport
/// failure ("connection refused") usually sits a few levels down.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn map_http_error(err: HttpError) -> ControlPlaneError {
    match err {
        HttpError::Interrupted(reason) => ControlPlaneError::Interrupted(reason),
        HttpError::AttemptTimeout(after) => {
            ControlPlaneError::Timeout(format!("no response within {after:?}"))
        }
        HttpError::Transport(e) | HttpError::ReadBody(e) => ControlPlaneError::Transport(error_chain(&e)),
        HttpError::Build { message, .. } => ControlPlaneError::Invalid(message),
        HttpError::Decode { .. } => ControlPlaneError::Decode(err.to_string()),
        HttpError::Status { status, body } => match StatusCode::from_u16(status) {
            Ok(code) => map_status(code, &body, "resource", ""),
            Err(_) => ControlPlaneError::UnexpectedServer { status, message: body },
        },
    }
}

/// A 409 on a create means the resource is already there; anywhere else it
/// is an optimistic-concurrency clash that a fresh attempt can resolve.
fn map_response_status(
    method: &Method,
    status: StatusCode,
    body: &str,
    kind: &'static str,
    name: &str,
) -> ControlPlaneError {
    if status == StatusCode::CONFLICT && *method == Method::POST {
        return ControlPlaneError::AlreadyExists(body.to_string());
    }
    map_status(status, body, kind, name)
}

fn map_status(status: StatusCode, body: &str, kind: &'static str, name: &str) -> ControlPlaneError {
    let message = body.to_string();
    match status {
        StatusCode::NOT_FOUND => ControlPlaneError::not_found(kind, name),
        StatusCode::CONFLICT => ControlPlaneError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT => ControlPlaneError::Timeout(message),
        StatusCode::GATEWAY_TIMEOUT => ControlPlaneError::ServerTimeout(message),
        StatusCode::SERVICE_UNAVAILABLE => ControlPlaneError::ServiceUnavailable(message),
        StatusCode::INTERNAL_SERVER_ERROR => ControlPlaneError::Internal(message),
        StatusCode::TOO_MANY_REQUESTS => ControlPlaneError::TooManyRequests(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ControlPlaneError::Forbidden(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ControlPlaneError::Invalid(message),
        other => ControlPlaneError::UnexpectedServer {
            status: other.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlaneClient {
    async fn get_project(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
    ) -> Result<Project, ControlPlaneError> {
        let url = self.org_url(org, &format!("projects/{project}"));
        self.fetch(ctx, HttpRequest::get("cp.GetProject", url), StatusCode::OK, "project", project)
            .await
    }

    async fn get_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Component, ControlPlaneError> {
        let url = self.org_url(org, &format!("projects/{project}/components/{component}"));
        self.fetch(ctx, HttpRequest::get("cp.GetComponent", url), StatusCode::OK, "component", component)
            .await
    }

    async fn create_build(
        &self,
        ctx: &CallContext,
        org: &str,
        request: &BuildRequest,
    ) -> Result<Build, ControlPlaneError> {
        let url = self.org_url(org, "builds");
        let http = HttpRequest::post("cp.CreateBuild", url).json(request);
        self.fetch(ctx, http, StatusCode::CREATED, "component", &request.component_name)
            .await
    }

    async fn list_builds(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Build>, ControlPlaneError> {
        let http = HttpRequest::get("cp.ListBuilds", self.org_url(org, "builds"))
            .query("project", project)
            .query("component", component);
        self.fetch_list(ctx, http, "builds").await
    }

    async fn get_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<Build, ControlPlaneError> {
        let url = self.org_url(org, &format!("builds/{build}"));
        self.fetch(ctx, HttpRequest::get("cp.GetBuild", url), StatusCode::OK, "build", build)
            .await
    }

    async fn list_workloads(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Workload>, ControlPlaneError> {
        let http = HttpRequest::get("cp.ListWorkloads", self.org_url(org, "workloads"))
            .query("project", project)
            .query("component", component);
        self.fetch_list(ctx, http, "workloads").await
    }

    async fn update_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &Workload,
    ) -> Result<Workload, ControlPlaneError> {
        let url = self.org_url(org, &format!("workloads/{}", workload.name));
        let http = HttpRequest::put("cp.UpdateWorkload", url).json(workload);
        self.fetch(ctx, http, StatusCode::OK, "workload", &workload.name)
            .await
    }

    async fn get_deployment_pipeline(
        &self,
        ctx: &CallContext,
        org: &str,
        pipeline: &str,
    ) -> Result<DeploymentPipeline, ControlPlaneError> {
        let url = self.org_url(org, &format!("deployment-pipelines/{pipeline}"));
        self.fetch(
            ctx,
            HttpRequest::get("cp.GetDeploymentPipeline", url),
            StatusCode::OK,
            "deployment pipeline",
            pipeline,
        )
        .await
    }

    async fn list_environments(
        &self,
        ctx: &CallContext,
        org: &str,
    ) -> Result<Vec<Environment>, ControlPlaneError> {
        let http = HttpRequest::get("cp.ListEnvironments", self.org_url(org, "environments"));
        self.fetch_list(ctx, http, "environments").await
    }

    async fn get_environment(
        &self,
        ctx: &CallContext,
        org: &str,
        environment: &str,
    ) -> Result<Environment, ControlPlaneError> {
        let url = self.org_url(org, &format!("environments/{environment}"));
        self.fetch(ctx, HttpRequest::get("cp.GetEnvironment", url), StatusCode::OK, "environment", environment)
            .await
    }

    async fn list_release_bindings(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<ReleaseBinding>, ControlPlaneError> {
        let http = HttpRequest::get("cp.ListReleaseBindings", self.org_url(org, "release-bindings"))
            .query("project", project)
            .query("component", component);
        self.fetch_list(ctx, http, "release bindings").await
    }

    async fn list_releases(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Release>, ControlPlaneError> {
        let http = HttpRequest::get("cp.ListReleases", self.org_url(org, "releases"))
            .query("project", project)
            .query("component", component);
        self.fetch_list(ctx, http, "releases").await
    }

    async fn delete_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<(), ControlPlaneError> {
        let url = self.org_url(org, &format!("builds/{build}"));
        self.remove(ctx, HttpRequest::delete("cp.DeleteBuild", url), "build", build)
            .await
    }

    async fn delete_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &str,
    ) -> Result<(), ControlPlaneError> {
        let url = self.org_url(org, &format!("workloads/{workload}"));
        self.remove(ctx, HttpRequest::delete("cp.DeleteWorkload", url), "workload", workload)
            .await
    }

    async fn delete_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<(), ControlPlaneError> {
        let url = self.org_url(org, &format!("projects/{project}/components/{component}"));
        self.remove(ctx, HttpRequest::delete("cp.DeleteComponent", url), "component", component)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "", "project", "demo"),
            ControlPlaneError::NotFound { kind: "project", ref name } if name == "demo"
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, "busy", "project", "demo"),
            ControlPlaneError::ServiceUnavailable(ref m) if m == "busy"
        ));
        assert!(matches!(
            map_status(StatusCode::CONFLICT, "", "workload", "w"),
            ControlPlaneError::Conflict(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "", "workload", "w"),
            ControlPlaneError::UnexpectedServer { status: 502, .. }
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "", "workload", "w"),
            ControlPlaneError::Forbidden(_)
        ));
    }

    #[test]
    fn test_conflict_on_create_is_already_exists() {
        let body = r#"builds "triage-1" already exists"#;
        assert!(matches!(
            map_response_status(&Method::POST, StatusCode::CONFLICT, body, "build", "triage"),
            ControlPlaneError::AlreadyExists(ref m) if m == body
        ));
        assert!(matches!(
            map_response_status(&Method::PUT, StatusCode::CONFLICT, "stale", "workload", "w"),
            ControlPlaneError::Conflict(_)
        ));
        assert!(matches!(
            map_response_status(&Method::POST, StatusCode::BAD_REQUEST, "", "build", "triage"),
            ControlPlaneError::Invalid(_)
        ));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let outer = HttpError::Build {
            name: "x".into(),
            message: "y".into(),
        };
        assert_eq!(error_chain(&io), "connection refused");
        assert_eq!(error_chain(&outer), "failed to build request 'x': y");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpControlPlaneClient::new("http://cp.local/", Arc::new(reqwest::Client::new()));
        assert_eq!(
            client.org_url("acme", "environments"),
            "http://cp.local/api/v1/orgs/acme/environments"
        );
    }
}
