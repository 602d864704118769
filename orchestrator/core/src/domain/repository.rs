// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for agent metadata kept in the relational store.
//! The control plane owns builds and deployments; the store only remembers
//! which agents exist, how they are provisioned, and when they last changed.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentRepository` | `AgentRecord` | `InMemoryAgentRepository`, `PostgresAgentRepository` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::call_context::{CallContext, Interrupted};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningType {
    /// Built and deployed by the platform.
    Internal,
    /// Running elsewhere, only registered here.
    External,
}

impl ProvisioningType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningType::Internal => "internal",
            ProvisioningType::External => "external",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "internal" => Some(ProvisioningType::Internal),
            "external" => Some(ProvisioningType::External),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub org_name: String,
    pub project_name: String,
    pub name: String,
    pub display_name: String,
    pub provisioning: ProvisioningType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Find agent by name within a project
    async fn find_by_name(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError>;

    /// Save agent (create or update)
    async fn save(&self, ctx: &CallContext, agent: &AgentRecord) -> Result<(), RepositoryError>;

    /// Bump `updated_at` after a build or deploy
    async fn touch(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Remove the agent; `false` when there was nothing to remove
    async fn delete(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<bool, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}
