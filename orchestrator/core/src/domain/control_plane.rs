// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Plane Contract
//!
//! Resource shapes and client interface for the declarative control plane
//! that materializes builds, workloads, and releases. Resources converge
//! asynchronously; their progress is reported through [`Condition`]s.
//!
//! Implementations: `HttpControlPlaneClient` (REST) and `InMemoryControlPlane`
//! (development and tests), both in `crate::infrastructure::control_plane`.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Port for the external control plane

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::call_context::{CallContext, Interrupted};
use crate::domain::condition::Condition;
use crate::domain::promotion::PromotionPath;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub deployment_pipeline: String,
}

/// An agent, as the control plane knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    pub project_name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_production: bool,
    #[serde(default)]
    pub dns_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPipeline {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub promotion_paths: Vec<PromotionPath>,
}

/// Parameters for a new build of an agent's source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub project_name: String,
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub uid: String,
    pub name: String,
    pub project_name: String,
    pub component_name: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub image: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub project_name: String,
    pub component_name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Binding of a component's release to one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBinding {
    pub name: String,
    pub project_name: String,
    pub component_name: String,
    pub environment: String,
    #[serde(default)]
    pub release_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Rendered manifests of one component in one environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    pub project_name: String,
    pub component_name: String,
    pub environment: String,
    #[serde(default)]
    pub resources: Vec<Value>,
}

#[derive(Debug, Clone, Error)]
pub enum ControlPlaneError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("conflict: {0}")]
    Conflict(String),

    /// A create collided with an existing resource. Repeating it cannot help.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    #[error("server timeout: {0}")]
    ServerTimeout(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unexpected server response (status {status}): {message}")]
    UnexpectedServer { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode control plane response: {0}")]
    Decode(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ControlPlaneError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ControlPlaneError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ControlPlaneError::Interrupted(_))
    }
}

/// Client for the control plane. Each method is a single attempt; retries are
/// layered on top by the caller.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    async fn get_project(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
    ) -> Result<Project, ControlPlaneError>;

    async fn get_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Component, ControlPlaneError>;

    async fn create_build(
        &self,
        ctx: &CallContext,
        org: &str,
        request: &BuildRequest,
    ) -> Result<Build, ControlPlaneError>;

    async fn list_builds(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Build>, ControlPlaneError>;

    async fn get_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<Build, ControlPlaneError>;

    async fn list_workloads(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Workload>, ControlPlaneError>;

    async fn update_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &Workload,
    ) -> Result<Workload, ControlPlaneError>;

    async fn get_deployment_pipeline(
        &self,
        ctx: &CallContext,
        org: &str,
        pipeline: &str,
    ) -> Result<DeploymentPipeline, ControlPlaneError>;

    async fn list_environments(
        &self,
        ctx: &CallContext,
        org: &str,
    ) -> Result<Vec<Environment>, ControlPlaneError>;

    async fn get_environment(
        &self,
        ctx: &CallContext,
        org: &str,
        environment: &str,
    ) -> Result<Environment, ControlPlaneError>;

    async fn list_release_bindings(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<ReleaseBinding>, ControlPlaneError>;

    async fn list_releases(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Release>, ControlPlaneError>;

    async fn delete_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<(), ControlPlaneError>;

    async fn delete_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &str,
    ) -> Result<(), ControlPlaneError>;

    /// Removes the component itself; its builds and workloads are not touched.
    async fn delete_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<(), ControlPlaneError>;
}
