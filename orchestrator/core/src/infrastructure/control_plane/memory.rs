// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory control plane for development and tests.
//!
//! Holds resources in plain maps and counts calls per operation. Failures can
//! be scripted per operation with [`InMemoryControlPlane::fail_next`]; each
//! scripted error is returned once, in order, before the real answer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::build_status::BuildStage;
use crate::domain::call_context::CallContext;
use crate::domain::condition::{Condition, ConditionStatus};
use crate::domain::control_plane::{
    Build, BuildRequest, Component, ControlPlaneClient, ControlPlaneError, DeploymentPipeline,
    Environment, Project, Release, ReleaseBinding, Workload,
};

pub const GET_PROJECT: &str = "get_project";
pub const GET_COMPONENT: &str = "get_component";
pub const CREATE_BUILD: &str = "create_build";
pub const LIST_BUILDS: &str = "list_builds";
pub const GET_BUILD: &str = "get_build";
pub const LIST_WORKLOADS: &str = "list_workloads";
pub const UPDATE_WORKLOAD: &str = "update_workload";
pub const GET_DEPLOYMENT_PIPELINE: &str = "get_deployment_pipeline";
pub const LIST_ENVIRONMENTS: &str = "list_environments";
pub const GET_ENVIRONMENT: &str = "get_environment";
pub const LIST_RELEASE_BINDINGS: &str = "list_release_bindings";
pub const LIST_RELEASES: &str = "list_releases";
pub const DELETE_BUILD: &str = "delete_build";
pub const DELETE_WORKLOAD: &str = "delete_workload";
pub const DELETE_COMPONENT: &str = "delete_component";

#[derive(Default)]
struct State {
    projects: HashMap<(String, String), Project>,
    components: HashMap<(String, String, String), Component>,
    builds: HashMap<(String, String), Build>,
    workloads: HashMap<(String, String), Workload>,
    pipelines: HashMap<(String, String), DeploymentPipeline>,
    environments: HashMap<String, Vec<Environment>>,
    bindings: HashMap<String, Vec<ReleaseBinding>>,
    releases: HashMap<String, Vec<Release>>,
    failures: HashMap<&'static str, VecDeque<ControlPlaneError>>,
    calls: HashMap<&'static str, u32>,
}

#[derive(Clone, Default)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<State>>,
}

fn owned(parts: (&str, &str)) -> (String, String) {
    (parts.0.to_string(), parts.1.to_string())
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_project(&self, org: &str, project: Project) {
        self.lock()
            .projects
            .insert(owned((org, &project.name)), project);
    }

    pub fn insert_component(&self, org: &str, component: Component) {
        let key = (
            org.to_string(),
            component.project_name.clone(),
            component.name.clone(),
        );
        self.lock().components.insert(key, component);
    }

    pub fn insert_build(&self, org: &str, build: Build) {
        self.lock().builds.insert(owned((org, &build.name)), build);
    }

    pub fn insert_workload(&self, org: &str, workload: Workload) {
        self.lock()
            .workloads
            .insert(owned((org, &workload.name)), workload);
    }

    pub fn insert_pipeline(&self, org: &str, pipeline: DeploymentPipeline) {
        self.lock()
            .pipelines
            .insert(owned((org, &pipeline.name)), pipeline);
    }

    pub fn insert_environment(&self, org: &str, environment: Environment) {
        self.lock()
            .environments
            .entry(org.to_string())
            .or_default()
            .push(environment);
    }

    pub fn insert_release_binding(&self, org: &str, binding: ReleaseBinding) {
        self.lock()
            .bindings
            .entry(org.to_string())
            .or_default()
            .push(binding);
    }

    pub fn insert_release(&self, org: &str, release: Release) {
        self.lock()
            .releases
            .entry(org.to_string())
            .or_default()
            .push(release);
    }

    /// Queues errors returned by the next calls to `operation`, one per call.
    pub fn fail_next(&self, operation: &'static str, errors: impl IntoIterator<Item = ControlPlaneError>) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .extend(errors);
    }

    /// Number of times `operation` was invoked, failed attempts included.
    pub fn calls(&self, operation: &str) -> u32 {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn workload(&self, org: &str, name: &str) -> Option<Workload> {
        self.lock().workloads.get(&owned((org, name))).cloned()
    }

    pub fn component(&self, org: &str, project: &str, name: &str) -> Option<Component> {
        let key = (org.to_string(), project.to_string(), name.to_string());
        self.lock().components.get(&key).cloned()
    }

    pub fn workloads(&self, org: &str) -> Vec<Workload> {
        self.lock()
            .workloads
            .iter()
            .filter(|((o, _), _)| o == org)
            .map(|(_, w)| w.clone())
            .collect()
    }

    pub fn builds(&self, org: &str) -> Vec<Build> {
        self.lock()
            .builds
            .iter()
            .filter(|((o, _), _)| o == org)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Records the call and pops a scripted failure, if any.
    fn enter(&self, ctx: &CallContext, operation: &'static str) -> Result<MutexGuard<'_, State>, ControlPlaneError> {
        ctx.check()?;
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        if let Some(err) = state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }
}

fn scoped<T: Clone>(
    items: Option<&Vec<T>>,
    project: &str,
    component: &str,
    select: impl Fn(&T) -> (&str, &str),
) -> Vec<T> {
    items
        .map(|items| {
            items
                .iter()
                .filter(|item| select(item) == (project, component))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
    async fn get_project(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
    ) -> Result<Project, ControlPlaneError> {
        let state = self.enter(ctx, GET_PROJECT)?;
        state
            .projects
            .get(&owned((org, project)))
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("project", project))
    }

    async fn get_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Component, ControlPlaneError> {
        let state = self.enter(ctx, GET_COMPONENT)?;
        let key = (org.to_string(), project.to_string(), component.to_string());
        state
            .components
            .get(&key)
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("component", component))
    }

    async fn create_build(
        &self,
        ctx: &CallContext,
        org: &str,
        request: &BuildRequest,
    ) -> Result<Build, ControlPlaneError> {
        let mut state = self.enter(ctx, CREATE_BUILD)?;
        let uid = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let build = Build {
            name: format!("{}-{}", request.component_name, &uid[..8]),
            uid,
            project_name: request.project_name.clone(),
            component_name: request.component_name.clone(),
            commit: request.commit.clone().unwrap_or_default(),
            branch: "main".to_string(),
            image: String::new(),
            created_at: now,
            conditions: vec![Condition::new(
                BuildStage::Initiated.condition_type(),
                ConditionStatus::True,
                "BuildInitiated",
                now,
            )],
        };
        state.builds.insert(owned((org, &build.name)), build.clone());
        Ok(build)
    }

    async fn list_builds(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Build>, ControlPlaneError> {
        let state = self.enter(ctx, LIST_BUILDS)?;
        Ok(state
            .builds
            .iter()
            .filter(|((o, _), b)| {
                o == org && b.project_name == project && b.component_name == component
            })
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn get_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<Build, ControlPlaneError> {
        let state = self.enter(ctx, GET_BUILD)?;
        state
            .builds
            .get(&owned((org, build)))
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("build", build))
    }

    async fn list_workloads(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Workload>, ControlPlaneError> {
        let state = self.enter(ctx, LIST_WORKLOADS)?;
        Ok(state
            .workloads
            .iter()
            .filter(|((o, _), w)| {
                o == org && w.project_name == project && w.component_name == component
            })
            .map(|(_, w)| w.clone())
            .collect())
    }

    async fn update_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &Workload,
    ) -> Result<Workload, ControlPlaneError> {
        let mut state = self.enter(ctx, UPDATE_WORKLOAD)?;
        let key = owned((org, &workload.name));
        if !state.workloads.contains_key(&key) {
            return Err(ControlPlaneError::not_found("workload", &workload.name));
        }
        state.workloads.insert(key, workload.clone());
        Ok(workload.clone())
    }

    async fn get_deployment_pipeline(
        &self,
        ctx: &CallContext,
        org: &str,
        pipeline: &str,
    ) -> Result<DeploymentPipeline, ControlPlaneError> {
        let state = self.enter(ctx, GET_DEPLOYMENT_PIPELINE)?;
        state
            .pipelines
            .get(&owned((org, pipeline)))
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("deployment pipeline", pipeline))
    }

    async fn list_environments(
        &self,
        ctx: &CallContext,
        org: &str,
    ) -> Result<Vec<Environment>, ControlPlaneError> {
        let state = self.enter(ctx, LIST_ENVIRONMENTS)?;
        Ok(state.environments.get(org).cloned().unwrap_or_default())
    }

    async fn get_environment(
        &self,
        ctx: &CallContext,
        org: &str,
        environment: &str,
    ) -> Result<Environment, ControlPlaneError> {
        let state = self.enter(ctx, GET_ENVIRONMENT)?;
        state
            .environments
            .get(org)
            .and_then(|envs| envs.iter().find(|e| e.name == environment))
            .cloned()
            .ok_or_else(|| ControlPlaneError::not_found("environment", environment))
    }

    async fn list_release_bindings(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<ReleaseBinding>, ControlPlaneError> {
        let state = self.enter(ctx, LIST_RELEASE_BINDINGS)?;
        Ok(scoped(state.bindings.get(org), project, component, |b| {
            (b.project_name.as_str(), b.component_name.as_str())
        }))
    }

    async fn list_releases(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<Vec<Release>, ControlPlaneError> {
        let state = self.enter(ctx, LIST_RELEASES)?;
        Ok(scoped(state.releases.get(org), project, component, |r| {
            (r.project_name.as_str(), r.component_name.as_str())
        }))
    }

    async fn delete_build(
        &self,
        ctx: &CallContext,
        org: &str,
        build: &str,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.enter(ctx, DELETE_BUILD)?;
        state
            .builds
            .remove(&owned((org, build)))
            .map(|_| ())
            .ok_or_else(|| ControlPlaneError::not_found("build", build))
    }

    async fn delete_workload(
        &self,
        ctx: &CallContext,
        org: &str,
        workload: &str,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.enter(ctx, DELETE_WORKLOAD)?;
        state
            .workloads
            .remove(&owned((org, workload)))
            .map(|_| ())
            .ok_or_else(|| ControlPlaneError::not_found("workload", workload))
    }

    async fn delete_component(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        component: &str,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.enter(ctx, DELETE_COMPONENT)?;
        let key = (org.to_string(), project.to_string(), component.to_string());
        state
            .components
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ControlPlaneError::not_found("component", component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let cp = InMemoryControlPlane::new();
        cp.insert_project(
            "acme",
            Project {
                name: "support".into(),
                deployment_pipeline: "default".into(),
                ..Default::default()
            },
        );
        cp.fail_next(
            GET_PROJECT,
            [
                ControlPlaneError::ServiceUnavailable("one".into()),
                ControlPlaneError::Timeout("two".into()),
            ],
        );

        let ctx = CallContext::new();
        assert!(matches!(
            cp.get_project(&ctx, "acme", "support").await,
            Err(ControlPlaneError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            cp.get_project(&ctx, "acme", "support").await,
            Err(ControlPlaneError::Timeout(_))
        ));
        assert_eq!(cp.get_project(&ctx, "acme", "support").await.unwrap().name, "support");
        assert_eq!(cp.calls(GET_PROJECT), 3);
    }

    #[tokio::test]
    async fn test_create_build_starts_initiated() {
        let cp = InMemoryControlPlane::new();
        let request = BuildRequest {
            project_name: "support".into(),
            component_name: "triage".into(),
            commit: Some("abc123".into()),
        };
        let build = cp.create_build(&CallContext::new(), "acme", &request).await.unwrap();

        assert!(build.name.starts_with("triage-"));
        assert_eq!(build.commit, "abc123");
        assert_eq!(build.conditions.len(), 1);
        assert_eq!(build.conditions[0].condition_type, "BuildInitiated");
        assert_eq!(cp.builds("acme").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_once() {
        let cp = InMemoryControlPlane::new();
        cp.insert_workload(
            "acme",
            Workload {
                name: "triage-workload".into(),
                project_name: "support".into(),
                component_name: "triage".into(),
                ..Default::default()
            },
        );
        let ctx = CallContext::new();

        cp.delete_workload(&ctx, "acme", "triage-workload").await.unwrap();
        assert!(cp.workload("acme", "triage-workload").is_none());
        let again = cp.delete_workload(&ctx, "acme", "triage-workload").await.unwrap_err();
        assert!(again.is_not_found());
        assert_eq!(cp.calls(DELETE_WORKLOAD), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_workload_is_not_found() {
        let cp = InMemoryControlPlane::new();
        let err = cp
            .update_workload(&CallContext::new(), "acme", &Workload::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
