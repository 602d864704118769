// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Orchestration Use Cases
//!
//! Operations the platform performs on an agent through the control plane:
//! triggering and inspecting builds, deploying a new image, listing where the
//! agent runs, reading what one environment serves, and deleting the agent.
//! Implemented by
//! [`StandardAgentOrchestrationService`](crate::application::orchestration::StandardAgentOrchestrationService).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::build_status::{BuildStatusLabel, BuildStep, DerivedBuildStatus};
use crate::domain::call_context::{CallContext, Interrupted};
use crate::domain::control_plane::{Build, ControlPlaneError};
use crate::domain::deployment_status::{DeploymentStatus, Endpoint, EnvVar};
use crate::domain::promotion::PromotionTarget;
use crate::domain::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub name: String,
    pub uid: String,
    pub project_name: String,
    pub agent_name: String,
    pub commit: String,
    pub branch: String,
    pub image: String,
    pub status: BuildStatusLabel,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BuildSummary {
    pub fn from_build(build: &Build) -> Self {
        let derived = DerivedBuildStatus::from_conditions(&build.conditions);
        Self::with_status(build, &derived)
    }

    fn with_status(build: &Build, derived: &DerivedBuildStatus) -> Self {
        Self {
            name: build.name.clone(),
            uid: build.uid.clone(),
            project_name: build.project_name.clone(),
            agent_name: build.component_name.clone(),
            commit: build.commit.clone(),
            branch: build.branch.clone(),
            image: build.image.clone(),
            status: derived.status.clone(),
            started_at: build.created_at,
            ended_at: derived.ended_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetails {
    #[serde(flatten)]
    pub summary: BuildSummary,
    pub percent_complete: u8,
    pub steps: Vec<BuildStep>,
    pub duration_seconds: Option<i64>,
}

impl BuildDetails {
    pub fn from_build(build: &Build) -> Self {
        let derived = DerivedBuildStatus::from_conditions(&build.conditions);
        Self {
            summary: BuildSummary::with_status(build, &derived),
            percent_complete: derived.percent_complete,
            duration_seconds: derived.duration_seconds(build.created_at),
            steps: derived.steps,
        }
    }
}

/// Where an agent stands in one environment of its pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub environment: String,
    pub environment_display_name: String,
    pub status: DeploymentStatus,
    pub image_id: Option<String>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub endpoints: Vec<Endpoint>,
    pub promotion_target: Option<PromotionTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    pub image: String,
    /// Replaces the workload's environment variables; keys left out are removed
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub workload: String,
    pub image: String,
    /// Entry environment of the pipeline; `None` when the pipeline has no
    /// unambiguous entry point.
    pub environment: Option<String>,
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("build '{0}' not found")]
    BuildNotFound(String),

    #[error("deployment pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("project '{0}' has no deployment pipeline configured")]
    NoDeploymentPipeline(String),

    #[error("environment '{0}' not found")]
    EnvironmentNotFound(String),

    #[error("no workload found for agent '{0}'")]
    WorkloadNotFound(String),

    #[error("agent '{agent}' does not belong to project '{project}'")]
    ProjectMismatch { agent: String, project: String },

    #[error("agent '{0}' is externally provisioned and not managed by the platform")]
    ExternalAgent(String),

    #[error("control plane request failed: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("agent store request failed: {0}")]
    Repository(#[from] RepositoryError),
}

impl OrchestrationError {
    /// Cancellation or deadline, from whichever collaborator noticed first.
    pub fn interrupted(&self) -> Option<Interrupted> {
        match self {
            OrchestrationError::ControlPlane(ControlPlaneError::Interrupted(reason))
            | OrchestrationError::Repository(RepositoryError::Interrupted(reason)) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OrchestrationError::AgentNotFound(_)
                | OrchestrationError::ProjectNotFound(_)
                | OrchestrationError::BuildNotFound(_)
                | OrchestrationError::PipelineNotFound(_)
                | OrchestrationError::EnvironmentNotFound(_)
                | OrchestrationError::WorkloadNotFound(_)
        )
    }
}

#[async_trait]
pub trait AgentOrchestrationService: Send + Sync {
    async fn trigger_build(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        commit: Option<&str>,
    ) -> Result<BuildSummary, OrchestrationError>;

    async fn list_builds(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<Vec<BuildSummary>, OrchestrationError>;

    async fn get_build(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        build: &str,
    ) -> Result<BuildDetails, OrchestrationError>;

    async fn deploy_agent(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        request: DeployRequest,
    ) -> Result<DeployOutcome, OrchestrationError>;

    async fn list_deployments(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<Vec<DeploymentSummary>, OrchestrationError>;

    /// Invoke URLs the agent serves in one environment. Empty when the agent
    /// was never released there.
    async fn get_agent_endpoints(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        environment: &str,
    ) -> Result<Vec<Endpoint>, OrchestrationError>;

    /// Environment variables of the agent's container as released to one
    /// environment.
    async fn get_agent_configurations(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        environment: &str,
    ) -> Result<Vec<EnvVar>, OrchestrationError>;

    /// Removes the agent's builds, workloads and component, then its store
    /// record. Deleting an agent that is already gone succeeds.
    async fn delete_agent(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<(), OrchestrationError>;
}
