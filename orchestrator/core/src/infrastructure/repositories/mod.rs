// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve agent metadata
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresAgentRepository** - `agents` table through [`RetryingPool`](crate::infrastructure::db::RetryingPool)
//! - **InMemoryAgentRepository** - Thread-safe HashMap-backed storage for development and tests

pub mod postgres_agent;

pub use postgres_agent::PostgresAgentRepository;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::call_context::CallContext;
use crate::domain::repository::{AgentRecord, AgentRepository, RepositoryError};

type AgentKey = (String, String, String);

fn key(org: &str, project: &str, name: &str) -> AgentKey {
    (org.to_string(), project.to_string(), name.to_string())
}

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentKey, AgentRecord>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_name(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        ctx.check()?;
        let agents = self
            .agents
            .read()
            .map_err(|_| RepositoryError::Database("agent store lock poisoned".to_string()))?;
        Ok(agents.get(&key(org, project, name)).cloned())
    }

    async fn save(&self, ctx: &CallContext, agent: &AgentRecord) -> Result<(), RepositoryError> {
        ctx.check()?;
        let mut agents = self
            .agents
            .write()
            .map_err(|_| RepositoryError::Database("agent store lock poisoned".to_string()))?;
        agents.insert(
            key(&agent.org_name, &agent.project_name, &agent.name),
            agent.clone(),
        );
        Ok(())
    }

    async fn touch(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        ctx.check()?;
        let mut agents = self
            .agents
            .write()
            .map_err(|_| RepositoryError::Database("agent store lock poisoned".to_string()))?;
        match agents.get_mut(&key(org, project, name)) {
            Some(agent) => {
                agent.updated_at = at;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("agent {org}/{project}/{name}"))),
        }
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        ctx.check()?;
        let mut agents = self
            .agents
            .write()
            .map_err(|_| RepositoryError::Database("agent store lock poisoned".to_string()))?;
        Ok(agents.remove(&key(org, project, name)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::ProvisioningType;
    use chrono::TimeZone;

    fn record(name: &str) -> AgentRecord {
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        AgentRecord {
            org_name: "acme".to_string(),
            project_name: "support".to_string(),
            name: name.to_string(),
            display_name: name.to_uppercase(),
            provisioning: ProvisioningType::Internal,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_save_find_touch() {
        let repo = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        repo.save(&ctx, &record("triage")).await.unwrap();

        let found = repo.find_by_name(&ctx, "acme", "support", "triage").await.unwrap();
        assert_eq!(found.map(|a| a.display_name), Some("TRIAGE".to_string()));
        assert!(repo.find_by_name(&ctx, "acme", "other", "triage").await.unwrap().is_none());

        let later = Utc.timestamp_opt(1_700_000_500, 0).unwrap();
        repo.touch(&ctx, "acme", "support", "triage", later).await.unwrap();
        let touched = repo.find_by_name(&ctx, "acme", "support", "triage").await.unwrap().unwrap();
        assert_eq!(touched.updated_at, later);
    }

    #[tokio::test]
    async fn test_delete_agent() {
        let repo = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        repo.save(&ctx, &record("triage")).await.unwrap();

        assert!(repo.delete(&ctx, "acme", "support", "triage").await.unwrap());
        assert!(repo.find_by_name(&ctx, "acme", "support", "triage").await.unwrap().is_none());
        assert!(!repo.delete(&ctx, "acme", "support", "triage").await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_missing_agent() {
        let repo = InMemoryAgentRepository::new();
        let err = repo
            .touch(&CallContext::new(), "acme", "support", "ghost", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_context_is_rejected() {
        let repo = InMemoryAgentRepository::new();
        let ctx = CallContext::new();
        ctx.cancel();
        let err = repo.find_by_name(&ctx, "acme", "support", "x").await.unwrap_err();
        assert!(matches!(err, RepositoryError::Interrupted(_)));
    }
}
