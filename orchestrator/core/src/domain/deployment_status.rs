// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Deployment Status Derivation
//!
//! Maps a release binding's `Ready` condition onto the platform's deployment
//! status vocabulary and pulls the deployed image, container environment and
//! invoke URLs out of the raw manifests carried by a release.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Pure derivations over control-plane status payloads

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::{Condition, ConditionSet, ConditionStatus};

pub const READY_CONDITION: &str = "Ready";

/// Port exposed by the platform gateway in front of every HTTPRoute.
pub const GATEWAY_PORT: u16 = 9080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Active,
    Suspended,
    InProgress,
    Failed,
    NotDeployed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Active => "active",
            DeploymentStatus::Suspended => "suspended",
            DeploymentStatus::InProgress => "in-progress",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::NotDeployed => "not-deployed",
        }
    }

    /// Status for a `Ready` condition whose status is not true.
    fn from_not_ready_reason(reason: &str) -> Self {
        match reason {
            "ResourcesSuspended" => DeploymentStatus::Suspended,
            "ResourcesProgressing" | "ReleaseProgressing" => DeploymentStatus::InProgress,
            "ResourcesDegraded" | "ReleaseFailed" => DeploymentStatus::Failed,
            _ => DeploymentStatus::NotDeployed,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the deployment status of a binding.
///
/// `generation` is the binding's current spec generation when the control
/// plane reports one. A `Ready` condition observed at an older generation
/// describes a previous spec and yields `InProgress`.
pub fn deployment_status(conditions: &[Condition], generation: Option<i64>) -> DeploymentStatus {
    let set = ConditionSet::new(conditions);
    let Some(ready) = set.get(READY_CONDITION) else {
        return DeploymentStatus::NotDeployed;
    };

    if let (Some(current), Some(observed)) = (generation, ready.observed_generation) {
        if observed < current {
            return DeploymentStatus::InProgress;
        }
    }

    match ready.status {
        ConditionStatus::True => DeploymentStatus::Active,
        ConditionStatus::False | ConditionStatus::Unknown => {
            DeploymentStatus::from_not_ready_reason(&ready.reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
}

fn resources_of_kind<'a>(resources: &'a [Value], kind: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    resources
        .iter()
        .filter(move |r| r.get("kind").and_then(Value::as_str) == Some(kind))
}

/// Invoke URLs of every HTTPRoute in the release, in manifest order.
pub fn endpoints_from_resources(resources: &[Value]) -> Vec<Endpoint> {
    resources_of_kind(resources, "HTTPRoute")
        .filter_map(|route| {
            let host = route
                .pointer("/spec/hostnames/0")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())?;
            let path = route
                .pointer("/spec/rules/0/matches/0/path/value")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(Endpoint {
                url: format!("http://{host}:{GATEWAY_PORT}{path}"),
            })
        })
        .collect()
}

/// The first Deployment's `main` container, else its first container.
fn primary_container(resources: &[Value]) -> Option<&Value> {
    resources_of_kind(resources, "Deployment").find_map(|deployment| {
        let containers = deployment
            .pointer("/spec/template/spec/containers")
            .and_then(Value::as_array)?;
        containers
            .iter()
            .find(|c| c.get("name").and_then(Value::as_str) == Some("main"))
            .or_else(|| containers.first())
    })
}

pub fn deployed_image_from_resources(resources: &[Value]) -> Option<String> {
    primary_container(resources)
        .and_then(|c| c.get("image"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Literal environment variables of the primary container, in manifest order.
/// Entries sourced from secrets or config maps carry no `value` and are
/// skipped.
pub fn container_env_from_resources(resources: &[Value]) -> Vec<EnvVar> {
    primary_container(resources)
        .and_then(|c| c.get("env"))
        .and_then(Value::as_array)
        .map(|env| {
            env.iter()
                .filter_map(|entry| {
                    Some(EnvVar {
                        key: entry.get("name")?.as_str()?.to_string(),
                        value: entry.get("value")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
