// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Standard Agent Orchestration Service
//!
//! Composes control-plane calls into the agent use cases. Every control-plane
//! call is wrapped in the retry executor with the service's control-plane
//! policy; an operation either completes every call it needs or fails as a
//! whole. Updating the agent's timestamp in the relational store is the one
//! best-effort step: its failure is logged and does not fail the operation.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Collaborators:** `ControlPlaneClient`, optional `AgentRepository`

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::application::agent_orchestration::{
    AgentOrchestrationService, BuildDetails, BuildSummary, DeployOutcome, DeployRequest,
    DeploymentSummary, OrchestrationError,
};
use crate::domain::call_context::CallContext;
use crate::domain::condition::ConditionSet;
use crate::domain::control_plane::{
    BuildRequest, Component, ControlPlaneClient, ControlPlaneError, DeploymentPipeline, Environment,
    Project, Release, ReleaseBinding,
};
use crate::domain::deployment_status::{
    container_env_from_resources, deployed_image_from_resources, deployment_status,
    endpoints_from_resources, DeploymentStatus, Endpoint, EnvVar,
};
use crate::domain::promotion::{build_environment_order, find_lowest_environment, find_promotion_target};
use crate::domain::repository::{AgentRepository, ProvisioningType};
use crate::domain::retry::RetryPolicy;
use crate::infrastructure::retry;
use crate::infrastructure::transient::default_control_plane_policy;

pub struct StandardAgentOrchestrationService {
    control_plane: Arc<dyn ControlPlaneClient>,
    policy: RetryPolicy<ControlPlaneError>,
    agents: Option<Arc<dyn AgentRepository>>,
}

impl StandardAgentOrchestrationService {
    pub fn new(control_plane: Arc<dyn ControlPlaneClient>) -> Self {
        Self {
            control_plane,
            policy: default_control_plane_policy(),
            agents: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy<ControlPlaneError>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_agent_repository(mut self, agents: Arc<dyn AgentRepository>) -> Self {
        self.agents = Some(agents);
        self
    }

    async fn call<T, F, Fut>(&self, ctx: &CallContext, operation: &str, op: F) -> Result<T, ControlPlaneError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ControlPlaneError>>,
    {
        retry::execute(ctx, operation, &self.policy, op).await
    }

    /// Checks the agent against the relational store when one is configured.
    async fn ensure_agent(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        require_internal: bool,
    ) -> Result<(), OrchestrationError> {
        let Some(agents) = &self.agents else {
            return Ok(());
        };
        let record = agents
            .find_by_name(ctx, org, project, agent)
            .await?
            .ok_or_else(|| OrchestrationError::AgentNotFound(agent.to_string()))?;
        if require_internal && record.provisioning != ProvisioningType::Internal {
            return Err(OrchestrationError::ExternalAgent(agent.to_string()));
        }
        Ok(())
    }

    async fn touch_agent(&self, ctx: &CallContext, org: &str, project: &str, agent: &str) {
        let Some(agents) = &self.agents else {
            return;
        };
        if let Err(e) = agents.touch(ctx, org, project, agent, Utc::now()).await {
            warn!(org, project, agent, error = %e, "Failed to update agent timestamp");
        }
    }

    async fn fetch_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<Component, OrchestrationError> {
        let component = self
            .call(ctx, "GetComponent", move || {
                self.control_plane.get_component(ctx, org, project, agent)
            })
            .await
            .map_err(|e| not_found_as(e, || OrchestrationError::AgentNotFound(agent.to_string())))?;

        if component.project_name != project {
            return Err(OrchestrationError::ProjectMismatch {
                agent: agent.to_string(),
                project: project.to_string(),
            });
        }
        Ok(component)
    }

    async fn fetch_project_pipeline(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
    ) -> Result<(Project, DeploymentPipeline), OrchestrationError> {
        let project_res = self
            .call(ctx, "GetProject", move || {
                self.control_plane.get_project(ctx, org, project)
            })
            .await
            .map_err(|e| not_found_as(e, || OrchestrationError::ProjectNotFound(project.to_string())))?;

        if project_res.deployment_pipeline.is_empty() {
            return Err(OrchestrationError::NoDeploymentPipeline(project.to_string()));
        }
        let pipeline_name = project_res.deployment_pipeline.as_str();
        let pipeline = self
            .call(ctx, "GetDeploymentPipeline", move || {
                self.control_plane.get_deployment_pipeline(ctx, org, pipeline_name)
            })
            .await
            .map_err(|e| {
                not_found_as(e, || OrchestrationError::PipelineNotFound(pipeline_name.to_string()))
            })?;

        Ok((project_res, pipeline))
    }

    /// Release currently bound to `environment`, after checking the
    /// environment exists. `None` when the agent was never released there.
    async fn fetch_environment_release(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        environment: &str,
    ) -> Result<Option<Release>, OrchestrationError> {
        self.call(ctx, "GetEnvironment", move || {
            self.control_plane.get_environment(ctx, org, environment)
        })
        .await
        .map_err(|e| not_found_as(e, || OrchestrationError::EnvironmentNotFound(environment.to_string())))?;

        let bindings = self
            .call(ctx, "ListReleaseBindings", move || {
                self.control_plane.list_release_bindings(ctx, org, project, agent)
            })
            .await?;
        let Some(binding) = bindings.iter().find(|b| b.environment == environment) else {
            debug!(org, project, agent, environment, "Agent has no release binding");
            return Ok(None);
        };
        let releases = self
            .call(ctx, "ListReleases", move || {
                self.control_plane.list_releases(ctx, org, project, agent)
            })
            .await?;
        Ok(select_release(binding, &releases).cloned())
    }

    /// Deletes one resource, counting an already-missing one as deleted.
    async fn delete_idempotent<F, Fut>(
        &self,
        ctx: &CallContext,
        operation: &str,
        op: F,
    ) -> Result<(), ControlPlaneError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ControlPlaneError>>,
    {
        match self.call(ctx, operation, op).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

/// The release named by the binding, else the first one for its environment.
fn select_release<'a>(binding: &ReleaseBinding, releases: &'a [Release]) -> Option<&'a Release> {
    releases
        .iter()
        .find(|r| !binding.release_name.is_empty() && r.name == binding.release_name)
        .or_else(|| releases.iter().find(|r| r.environment == binding.environment))
}

fn not_found_as(
    err: ControlPlaneError,
    not_found: impl FnOnce() -> OrchestrationError,
) -> OrchestrationError {
    if err.is_not_found() {
        not_found()
    } else {
        OrchestrationError::ControlPlane(err)
    }
}

/// Summary for one pipeline environment. No binding means the agent was never
/// released there.
fn summarize_environment(
    environment: &str,
    pipeline: &DeploymentPipeline,
    environments: &HashMap<String, Environment>,
    binding: Option<&ReleaseBinding>,
    release: Option<&Release>,
) -> DeploymentSummary {
    let mut summary = DeploymentSummary {
        environment: environment.to_string(),
        environment_display_name: environments
            .get(environment)
            .map(|e| e.display_name.clone())
            .unwrap_or_default(),
        status: DeploymentStatus::NotDeployed,
        image_id: None,
        last_deployed_at: None,
        endpoints: Vec::new(),
        promotion_target: find_promotion_target(environment, &pipeline.promotion_paths, environments),
    };
    let Some(binding) = binding else {
        return summary;
    };

    let resources = release.map(|r| r.resources.as_slice()).unwrap_or_default();
    summary.status = deployment_status(&binding.conditions, binding.generation);
    summary.last_deployed_at = ConditionSet::new(&binding.conditions).latest_transition();
    summary.image_id = deployed_image_from_resources(resources);
    summary.endpoints = endpoints_from_resources(resources);
    summary
}

#[async_trait]
impl AgentOrchestrationService for StandardAgentOrchestrationService {
    async fn trigger_build(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        commit: Option<&str>,
    ) -> Result<BuildSummary, OrchestrationError> {
        info!(org, project, agent, commit, "Triggering build");
        self.ensure_agent(ctx, org, project, agent, true).await?;
        self.fetch_component(ctx, org, project, agent).await?;

        let request = BuildRequest {
            project_name: project.to_string(),
            component_name: agent.to_string(),
            commit: commit.map(str::to_string),
        };
        let request = &request;
        let build = self
            .call(ctx, "CreateBuild", move || {
                self.control_plane.create_build(ctx, org, request)
            })
            .await?;

        info!(org, project, agent, build = %build.name, "Build triggered");
        self.touch_agent(ctx, org, project, agent).await;
        Ok(BuildSummary::from_build(&build))
    }

    async fn list_builds(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<Vec<BuildSummary>, OrchestrationError> {
        self.fetch_component(ctx, org, project, agent).await?;
        let mut builds = self
            .call(ctx, "ListBuilds", move || {
                self.control_plane.list_builds(ctx, org, project, agent)
            })
            .await?;

        builds.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(builds.iter().map(BuildSummary::from_build).collect())
    }

    async fn get_build(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        build: &str,
    ) -> Result<BuildDetails, OrchestrationError> {
        let found = self
            .call(ctx, "GetBuild", move || {
                self.control_plane.get_build(ctx, org, build)
            })
            .await
            .map_err(|e| not_found_as(e, || OrchestrationError::BuildNotFound(build.to_string())))?;

        if found.project_name != project || found.component_name != agent {
            debug!(org, project, agent, build, "Build belongs to a different agent");
            return Err(OrchestrationError::BuildNotFound(build.to_string()));
        }
        Ok(BuildDetails::from_build(&found))
    }

    async fn deploy_agent(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        request: DeployRequest,
    ) -> Result<DeployOutcome, OrchestrationError> {
        info!(org, project, agent, image = %request.image, "Deploying agent");
        self.ensure_agent(ctx, org, project, agent, true).await?;

        let workloads = self
            .call(ctx, "ListWorkloads", move || {
                self.control_plane.list_workloads(ctx, org, project, agent)
            })
            .await?;
        let mut workload = workloads
            .into_iter()
            .find(|w| w.component_name == agent)
            .ok_or_else(|| OrchestrationError::WorkloadNotFound(agent.to_string()))?;

        workload.image = request.image.clone();
        workload.env = request.env;
        let workload = &workload;
        let updated = self
            .call(ctx, "UpdateWorkload", move || {
                self.control_plane.update_workload(ctx, org, workload)
            })
            .await?;

        let (_, pipeline) = self.fetch_project_pipeline(ctx, org, project).await?;
        let environment = find_lowest_environment(&pipeline.promotion_paths);
        if environment.is_none() {
            warn!(org, project, pipeline = %pipeline.name, "Pipeline has no entry environment");
        }

        info!(org, project, agent, workload = %updated.name, environment = ?environment, "Agent deployed");
        self.touch_agent(ctx, org, project, agent).await;
        Ok(DeployOutcome {
            workload: updated.name,
            image: updated.image,
            environment,
        })
    }

    async fn list_deployments(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<Vec<DeploymentSummary>, OrchestrationError> {
        self.ensure_agent(ctx, org, project, agent, false).await?;
        let (_, pipeline) = self.fetch_project_pipeline(ctx, org, project).await?;
        let order = build_environment_order(&pipeline.promotion_paths);

        let environments: HashMap<String, Environment> = self
            .call(ctx, "ListEnvironments", move || {
                self.control_plane.list_environments(ctx, org)
            })
            .await?
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        let bindings = self
            .call(ctx, "ListReleaseBindings", move || {
                self.control_plane.list_release_bindings(ctx, org, project, agent)
            })
            .await?;
        let releases = self
            .call(ctx, "ListReleases", move || {
                self.control_plane.list_releases(ctx, org, project, agent)
            })
            .await?;

        let deployments = order
            .iter()
            .map(|environment| {
                let binding = bindings.iter().find(|b| &b.environment == environment);
                let release = binding.and_then(|b| select_release(b, &releases));
                summarize_environment(environment, &pipeline, &environments, binding, release)
            })
            .collect();

        Ok(deployments)
    }

    async fn get_agent_endpoints(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        environment: &str,
    ) -> Result<Vec<Endpoint>, OrchestrationError> {
        self.ensure_agent(ctx, org, project, agent, true).await?;
        self.fetch_component(ctx, org, project, agent).await?;
        let release = self
            .fetch_environment_release(ctx, org, project, agent, environment)
            .await?;
        let endpoints = release
            .map(|r| endpoints_from_resources(&r.resources))
            .unwrap_or_default();
        debug!(org, project, agent, environment, count = endpoints.len(), "Fetched agent endpoints");
        Ok(endpoints)
    }

    async fn get_agent_configurations(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
        environment: &str,
    ) -> Result<Vec<EnvVar>, OrchestrationError> {
        self.ensure_agent(ctx, org, project, agent, true).await?;
        self.fetch_component(ctx, org, project, agent).await?;
        let release = self
            .fetch_environment_release(ctx, org, project, agent, environment)
            .await?;
        Ok(release
            .map(|r| container_env_from_resources(&r.resources))
            .unwrap_or_default())
    }

    async fn delete_agent(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        agent: &str,
    ) -> Result<(), OrchestrationError> {
        info!(org, project, agent, "Deleting agent");
        if let Some(agents) = &self.agents {
            if agents.find_by_name(ctx, org, project, agent).await?.is_none() {
                info!(org, project, agent, "Agent not in store, nothing to delete");
                return Ok(());
            }
        }

        let component = match self
            .call(ctx, "GetComponent", move || {
                self.control_plane.get_component(ctx, org, project, agent)
            })
            .await
        {
            Ok(component) => Some(component),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(component) = component {
            if component.project_name != project {
                return Err(OrchestrationError::ProjectMismatch {
                    agent: agent.to_string(),
                    project: project.to_string(),
                });
            }

            let builds = self
                .call(ctx, "ListBuilds", move || {
                    self.control_plane.list_builds(ctx, org, project, agent)
                })
                .await?;
            for build in &builds {
                let name = build.name.as_str();
                self.delete_idempotent(ctx, "DeleteBuild", move || {
                    self.control_plane.delete_build(ctx, org, name)
                })
                .await?;
            }

            let workloads = self
                .call(ctx, "ListWorkloads", move || {
                    self.control_plane.list_workloads(ctx, org, project, agent)
                })
                .await?;
            for workload in &workloads {
                let name = workload.name.as_str();
                self.delete_idempotent(ctx, "DeleteWorkload", move || {
                    self.control_plane.delete_workload(ctx, org, name)
                })
                .await?;
            }

            self.delete_idempotent(ctx, "DeleteComponent", move || {
                self.control_plane.delete_component(ctx, org, project, agent)
            })
            .await?;
            info!(
                org,
                project,
                agent,
                builds = builds.len(),
                workloads = workloads.len(),
                "Agent removed from control plane"
            );
        } else {
            debug!(org, project, agent, "Component already gone from control plane");
        }

        if let Some(agents) = &self.agents {
            if let Err(e) = agents.delete(ctx, org, project, agent).await {
                error!(org, project, agent, error = %e, "Agent removed from control plane but store delete failed");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::{Condition, ConditionStatus};
    use crate::domain::control_plane::{Build, Workload};
    use crate::domain::promotion::{PromotionPath, TargetEnvironment};
    use crate::domain::repository::AgentRecord;
    use crate::infrastructure::control_plane::memory::{self, InMemoryControlPlane};
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;

    const ORG: &str = "acme";
    const PROJECT: &str = "support";
    const AGENT: &str = "triage";

    fn seeded() -> InMemoryControlPlane {
        let cp = InMemoryControlPlane::new();
        cp.insert_project(
            ORG,
            Project {
                name: PROJECT.into(),
                display_name: "Support".into(),
                deployment_pipeline: "standard".into(),
            },
        );
        cp.insert_component(
            ORG,
            Component {
                name: AGENT.into(),
                project_name: PROJECT.into(),
                display_name: "Triage".into(),
            },
        );
        cp.insert_pipeline(
            ORG,
            DeploymentPipeline {
                name: "standard".into(),
                display_name: "Standard".into(),
                promotion_paths: vec![
                    PromotionPath::new("development", ["staging"]),
                    PromotionPath::with_targets(
                        "staging",
                        [TargetEnvironment {
                            name: "production".into(),
                            requires_approval: true,
                        }],
                    ),
                ],
            },
        );
        for (name, display) in [
            ("development", "Development"),
            ("staging", "Staging"),
            ("production", "Production"),
        ] {
            cp.insert_environment(
                ORG,
                Environment {
                    name: name.into(),
                    display_name: display.into(),
                    ..Default::default()
                },
            );
        }
        cp.insert_workload(
            ORG,
            Workload {
                name: "triage-workload".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                image: "registry.local/triage:v1".into(),
                env: [("LOG_LEVEL".to_string(), "info".to_string())].into(),
            },
        );
        cp
    }

    fn service(cp: &InMemoryControlPlane) -> StandardAgentOrchestrationService {
        StandardAgentOrchestrationService::new(Arc::new(cp.clone()))
    }

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn record(provisioning: ProvisioningType) -> AgentRecord {
        AgentRecord {
            org_name: ORG.into(),
            project_name: PROJECT.into(),
            name: AGENT.into(),
            display_name: "Triage".into(),
            provisioning,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_deployments_follows_pipeline_order() {
        let cp = seeded();
        cp.insert_release_binding(
            ORG,
            ReleaseBinding {
                name: "triage-development".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                environment: "development".into(),
                release_name: "triage-development-r1".into(),
                generation: Some(2),
                conditions: vec![
                    Condition::new("Ready", ConditionStatus::True, "Ready", at(30))
                        .with_observed_generation(2),
                    Condition::new("Synced", ConditionStatus::True, "Synced", at(10)),
                ],
            },
        );
        cp.insert_release_binding(
            ORG,
            ReleaseBinding {
                name: "triage-staging".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                environment: "staging".into(),
                conditions: vec![Condition::new(
                    "Ready",
                    ConditionStatus::False,
                    "ResourcesDegraded",
                    at(40),
                )],
                ..Default::default()
            },
        );
        cp.insert_release(
            ORG,
            Release {
                name: "triage-development-r1".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                environment: "development".into(),
                resources: vec![
                    json!({
                        "kind": "Deployment",
                        "spec": {"template": {"spec": {"containers": [
                            {"name": "sidecar", "image": "proxy:1"},
                            {"name": "main", "image": "registry.local/triage:v2"}
                        ]}}}
                    }),
                    json!({
                        "kind": "HTTPRoute",
                        "spec": {
                            "hostnames": ["triage.dev.acme.local"],
                            "rules": [{"matches": [{"path": {"value": "/chat"}}]}]
                        }
                    }),
                ],
            },
        );

        let ctx = CallContext::new();
        let deployments = service(&cp)
            .list_deployments(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap();

        let names: Vec<_> = deployments.iter().map(|d| d.environment.as_str()).collect();
        assert_eq!(names, ["development", "staging", "production"]);

        let dev = &deployments[0];
        assert_eq!(dev.status, DeploymentStatus::Active);
        assert_eq!(dev.environment_display_name, "Development");
        assert_eq!(dev.image_id.as_deref(), Some("registry.local/triage:v2"));
        assert_eq!(dev.last_deployed_at, Some(at(30)));
        assert_eq!(dev.endpoints[0].url, "http://triage.dev.acme.local:9080/chat");
        let target = dev.promotion_target.as_ref().unwrap();
        assert_eq!(target.name, "staging");
        assert_eq!(target.display_name, "Staging");
        assert!(!target.requires_approval);

        let staging = &deployments[1];
        assert_eq!(staging.status, DeploymentStatus::Failed);
        assert!(staging.image_id.is_none());
        assert!(staging.promotion_target.as_ref().unwrap().requires_approval);

        let production = &deployments[2];
        assert_eq!(production.status, DeploymentStatus::NotDeployed);
        assert!(production.last_deployed_at.is_none());
        assert!(production.promotion_target.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_deployments_retries_transient_reads() {
        let cp = seeded();
        cp.fail_next(
            memory::GET_PROJECT,
            [
                ControlPlaneError::ServiceUnavailable("service unavailable".into()),
                ControlPlaneError::ServiceUnavailable("service unavailable".into()),
            ],
        );

        let ctx = CallContext::new();
        let deployments = service(&cp)
            .list_deployments(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap();

        assert_eq!(deployments.len(), 3);
        assert_eq!(cp.calls(memory::GET_PROJECT), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_deployments_fails_when_budget_exhausted() {
        let cp = seeded();
        cp.fail_next(
            memory::LIST_RELEASES,
            (0..4).map(|_| ControlPlaneError::Timeout("slow".into())),
        );

        let ctx = CallContext::new();
        let err = service(&cp)
            .list_deployments(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::ControlPlane(ControlPlaneError::Timeout(_))
        ));
        assert_eq!(cp.calls(memory::LIST_RELEASES), 4);
    }

    #[tokio::test]
    async fn test_trigger_build_unknown_agent() {
        let cp = seeded();
        let ctx = CallContext::new();
        let err = service(&cp)
            .trigger_build(&ctx, ORG, PROJECT, "missing", None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::AgentNotFound(ref name) if name == "missing"));
        assert_eq!(cp.calls(memory::GET_COMPONENT), 1);
        assert_eq!(cp.calls(memory::CREATE_BUILD), 0);
    }

    #[tokio::test]
    async fn test_trigger_build_touches_agent() {
        let cp = seeded();
        let agents = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        agents.save(&ctx, &record(ProvisioningType::Internal)).await.unwrap();

        let svc = service(&cp).with_agent_repository(Arc::new(agents.clone()));
        let build = svc
            .trigger_build(&ctx, ORG, PROJECT, AGENT, Some("abc123"))
            .await
            .unwrap();

        assert_eq!(build.agent_name, AGENT);
        assert_eq!(build.commit, "abc123");
        assert_eq!(build.status.as_str(), "BuildInitiated");
        assert_eq!(cp.builds(ORG).len(), 1);

        let stored = agents.find_by_name(&ctx, ORG, PROJECT, AGENT).await.unwrap().unwrap();
        assert!(stored.updated_at > at(0));
    }

    #[tokio::test]
    async fn test_deploy_agent_updates_workload() {
        let cp = seeded();
        let ctx = CallContext::new();
        let request = DeployRequest {
            image: "registry.local/triage:v3".into(),
            env: [("MODEL".to_string(), "large".to_string())].into(),
        };

        let outcome = service(&cp)
            .deploy_agent(&ctx, ORG, PROJECT, AGENT, request)
            .await
            .unwrap();

        assert_eq!(outcome.environment.as_deref(), Some("development"));
        assert_eq!(outcome.image, "registry.local/triage:v3");
        let workload = cp.workload(ORG, "triage-workload").unwrap();
        assert_eq!(workload.image, "registry.local/triage:v3");
        assert_eq!(workload.env.get("LOG_LEVEL"), None);
        assert_eq!(workload.env.get("MODEL").map(String::as_str), Some("large"));
        assert_eq!(workload.env.len(), 1);
    }

    #[tokio::test]
    async fn test_deploy_rejects_external_agent() {
        let cp = seeded();
        let agents = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        agents.save(&ctx, &record(ProvisioningType::External)).await.unwrap();

        let err = service(&cp)
            .with_agent_repository(Arc::new(agents))
            .deploy_agent(&ctx, ORG, PROJECT, AGENT, DeployRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::ExternalAgent(_)));
        assert_eq!(cp.calls(memory::LIST_WORKLOADS), 0);
    }

    #[tokio::test]
    async fn test_invalid_update_fails_fast() {
        let cp = seeded();
        cp.fail_next(
            memory::UPDATE_WORKLOAD,
            [ControlPlaneError::Invalid("image is required".into())],
        );
        let ctx = CallContext::new();

        let err = service(&cp)
            .deploy_agent(&ctx, ORG, PROJECT, AGENT, DeployRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::ControlPlane(ControlPlaneError::Invalid(_))
        ));
        assert_eq!(cp.calls(memory::UPDATE_WORKLOAD), 1);
        assert_eq!(cp.calls(memory::GET_PROJECT), 0);
    }

    #[tokio::test]
    async fn test_builds_listed_newest_first_and_scoped_to_agent() {
        let cp = seeded();
        for (name, component, created) in [
            ("triage-a", AGENT, 10),
            ("triage-b", AGENT, 50),
            ("other-a", "other", 60),
        ] {
            cp.insert_build(
                ORG,
                Build {
                    uid: name.into(),
                    name: name.into(),
                    project_name: PROJECT.into(),
                    component_name: component.into(),
                    commit: String::new(),
                    branch: "main".into(),
                    image: String::new(),
                    created_at: at(created),
                    conditions: Vec::new(),
                },
            );
        }
        let svc = service(&cp);
        let ctx = CallContext::new();

        let builds = svc.list_builds(&ctx, ORG, PROJECT, AGENT).await.unwrap();
        let names: Vec<_> = builds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["triage-b", "triage-a"]);

        let details = svc.get_build(&ctx, ORG, PROJECT, AGENT, "triage-a").await.unwrap();
        assert_eq!(details.percent_complete, 0);
        assert_eq!(details.summary.status.as_str(), "Unknown");

        let err = svc
            .get_build(&ctx, ORG, PROJECT, AGENT, "other-a")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::BuildNotFound(_)));
    }

    #[tokio::test]
    async fn test_project_without_pipeline_fails_before_pipeline_read() {
        let cp = seeded();
        cp.insert_project(
            ORG,
            Project {
                name: PROJECT.into(),
                display_name: "Support".into(),
                deployment_pipeline: String::new(),
            },
        );
        let ctx = CallContext::new();

        let err = service(&cp)
            .list_deployments(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::NoDeploymentPipeline(ref p) if p == PROJECT));
        assert_eq!(err.to_string(), "project 'support' has no deployment pipeline configured");
        assert_eq!(cp.calls(memory::GET_DEPLOYMENT_PIPELINE), 0);
    }

    fn released_to_development(cp: &InMemoryControlPlane) {
        cp.insert_release_binding(
            ORG,
            ReleaseBinding {
                name: "triage-development".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                environment: "development".into(),
                release_name: "triage-development-r1".into(),
                ..Default::default()
            },
        );
        cp.insert_release(
            ORG,
            Release {
                name: "triage-development-r1".into(),
                project_name: PROJECT.into(),
                component_name: AGENT.into(),
                environment: "development".into(),
                resources: vec![
                    json!({
                        "kind": "Deployment",
                        "spec": {"template": {"spec": {"containers": [
                            {"name": "main", "image": "registry.local/triage:v2", "env": [
                                {"name": "MODEL", "value": "large"},
                                {"name": "LOG_LEVEL", "value": "debug"}
                            ]}
                        ]}}}
                    }),
                    json!({
                        "kind": "HTTPRoute",
                        "spec": {
                            "hostnames": ["triage.dev.acme.local"],
                            "rules": [{"matches": [{"path": {"value": "/chat"}}]}]
                        }
                    }),
                ],
            },
        );
    }

    #[tokio::test]
    async fn test_endpoints_and_configurations_per_environment() {
        let cp = seeded();
        released_to_development(&cp);
        let svc = service(&cp);
        let ctx = CallContext::new();

        let endpoints = svc
            .get_agent_endpoints(&ctx, ORG, PROJECT, AGENT, "development")
            .await
            .unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].url, "http://triage.dev.acme.local:9080/chat");

        let env = svc
            .get_agent_configurations(&ctx, ORG, PROJECT, AGENT, "development")
            .await
            .unwrap();
        let pairs: Vec<_> = env.iter().map(|v| (v.key.as_str(), v.value.as_str())).collect();
        assert_eq!(pairs, [("MODEL", "large"), ("LOG_LEVEL", "debug")]);

        // Known environment, nothing released there yet
        let staging = svc
            .get_agent_endpoints(&ctx, ORG, PROJECT, AGENT, "staging")
            .await
            .unwrap();
        assert!(staging.is_empty());

        let err = svc
            .get_agent_configurations(&ctx, ORG, PROJECT, AGENT, "qa")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::EnvironmentNotFound(ref e) if e == "qa"));
    }

    #[tokio::test]
    async fn test_endpoints_rejected_for_external_agent() {
        let cp = seeded();
        let agents = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        agents.save(&ctx, &record(ProvisioningType::External)).await.unwrap();

        let err = service(&cp)
            .with_agent_repository(Arc::new(agents))
            .get_agent_endpoints(&ctx, ORG, PROJECT, AGENT, "development")
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::ExternalAgent(_)));
        assert_eq!(cp.calls(memory::GET_ENVIRONMENT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_agent_cascades_with_retries() {
        let cp = seeded();
        for name in ["triage-a", "triage-b"] {
            cp.insert_build(
                ORG,
                Build {
                    uid: name.into(),
                    name: name.into(),
                    project_name: PROJECT.into(),
                    component_name: AGENT.into(),
                    commit: String::new(),
                    branch: "main".into(),
                    image: String::new(),
                    created_at: at(0),
                    conditions: Vec::new(),
                },
            );
        }
        cp.fail_next(
            memory::DELETE_BUILD,
            [ControlPlaneError::ServiceUnavailable("busy".into())],
        );
        let agents = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        agents.save(&ctx, &record(ProvisioningType::Internal)).await.unwrap();

        service(&cp)
            .with_agent_repository(Arc::new(agents.clone()))
            .delete_agent(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap();

        assert!(cp.builds(ORG).is_empty());
        assert!(cp.workloads(ORG).is_empty());
        assert!(cp.component(ORG, PROJECT, AGENT).is_none());
        assert_eq!(cp.calls(memory::DELETE_BUILD), 3);
        assert_eq!(cp.calls(memory::DELETE_WORKLOAD), 1);
        assert_eq!(cp.calls(memory::DELETE_COMPONENT), 1);
        assert!(agents.find_by_name(&ctx, ORG, PROJECT, AGENT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_agent_is_idempotent() {
        let cp = seeded();
        cp.fail_next(
            memory::DELETE_WORKLOAD,
            [ControlPlaneError::not_found("workload", "triage-workload")],
        );
        let svc = service(&cp);
        let ctx = CallContext::new();

        svc.delete_agent(&ctx, ORG, PROJECT, AGENT).await.unwrap();
        svc.delete_agent(&ctx, ORG, PROJECT, AGENT).await.unwrap();

        assert!(cp.component(ORG, PROJECT, AGENT).is_none());
        assert_eq!(cp.calls(memory::GET_COMPONENT), 2);
        assert_eq!(cp.calls(memory::DELETE_COMPONENT), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_agent_in_store_skips_control_plane() {
        let cp = seeded();
        let ctx = CallContext::new();

        service(&cp)
            .with_agent_repository(Arc::new(InMemoryAgentRepository::new()))
            .delete_agent(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap();

        assert_eq!(cp.calls(memory::GET_COMPONENT), 0);
        assert!(cp.component(ORG, PROJECT, AGENT).is_some());
    }

    #[tokio::test]
    async fn test_delete_stops_on_non_retryable_failure() {
        let cp = seeded();
        cp.fail_next(
            memory::DELETE_WORKLOAD,
            [ControlPlaneError::Forbidden("no".into())],
        );
        let ctx = CallContext::new();

        let err = service(&cp)
            .delete_agent(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::ControlPlane(ControlPlaneError::Forbidden(_))
        ));
        assert_eq!(cp.calls(memory::DELETE_WORKLOAD), 1);
        assert_eq!(cp.calls(memory::DELETE_COMPONENT), 0);
        assert!(cp.component(ORG, PROJECT, AGENT).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_first_call() {
        let cp = seeded();
        let ctx = CallContext::new();
        ctx.cancel();

        let err = service(&cp)
            .list_deployments(&ctx, ORG, PROJECT, AGENT)
            .await
            .unwrap_err();

        assert_eq!(err.interrupted(), Some(crate::domain::call_context::Interrupted::Cancelled));
        assert_eq!(cp.calls(memory::GET_PROJECT), 0);
    }
}
