// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Agent Repository
//!
//! Production `AgentRepository` backed by the `agents` table. Every statement
//! goes through [`RetryingPool`], so transient pool failures are retried with
//! the pool policy before surfacing as [`RepositoryError::Database`].
//!
//! The schema itself is owned by the platform's migrations:
//!
//! ```sql
//! agents (org_name, project_name, name, display_name, provisioning_type,
//!         created_at, updated_at, deleted_at)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::call_context::CallContext;
use crate::domain::repository::{AgentRecord, AgentRepository, ProvisioningType, RepositoryError};
use crate::infrastructure::db::{PoolError, RetryingPool};

pub struct PostgresAgentRepository {
    pool: RetryingPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: RetryingPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(context: &str, err: PoolError) -> RepositoryError {
    match err {
        PoolError::Interrupted(reason) => RepositoryError::Interrupted(reason),
        PoolError::Database(e) => RepositoryError::Database(format!("{context}: {e}")),
    }
}

fn row_to_agent(row: &PgRow) -> Result<AgentRecord, RepositoryError> {
    let provisioning: String = row.try_get("provisioning_type")?;
    let provisioning = ProvisioningType::parse(&provisioning).ok_or_else(|| {
        RepositoryError::Serialization(format!("unknown provisioning type '{provisioning}'"))
    })?;
    Ok(AgentRecord {
        org_name: row.try_get("org_name")?,
        project_name: row.try_get("project_name")?,
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        provisioning,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn find_by_name(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        let row = self
            .pool
            .run(ctx, "db.FindAgent", move |pool| async move {
                sqlx::query(
                    r#"
                    SELECT org_name, project_name, name, display_name,
                           provisioning_type, created_at, updated_at
                    FROM agents
                    WHERE org_name = $1 AND project_name = $2 AND name = $3
                      AND deleted_at IS NULL
                    "#,
                )
                .bind(org)
                .bind(project)
                .bind(name)
                .fetch_optional(&pool)
                .await
            })
            .await
            .map_err(|e| map_pool_error("Failed to find agent", e))?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn save(&self, ctx: &CallContext, agent: &AgentRecord) -> Result<(), RepositoryError> {
        self.pool
            .run(ctx, "db.SaveAgent", move |pool| async move {
                sqlx::query(
                    r#"
                    INSERT INTO agents (
                        org_name, project_name, name, display_name,
                        provisioning_type, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (org_name, project_name, name) DO UPDATE SET
                        display_name = EXCLUDED.display_name,
                        provisioning_type = EXCLUDED.provisioning_type,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(&agent.org_name)
                .bind(&agent.project_name)
                .bind(&agent.name)
                .bind(&agent.display_name)
                .bind(agent.provisioning.as_str())
                .bind(agent.created_at)
                .bind(agent.updated_at)
                .execute(&pool)
                .await
            })
            .await
            .map_err(|e| map_pool_error("Failed to save agent", e))?;
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
        let result = self
            .pool
            .run(ctx, "db.TouchAgent", move |pool| async move {
                sqlx::query(
                    r#"
                    UPDATE agents SET updated_at = $4
                    WHERE org_name = $1 AND project_name = $2 AND name = $3
                      AND deleted_at IS NULL
                    "#,
                )
                .bind(org)
                .bind(project)
                .bind(name)
                .bind(at)
                .execute(&pool)
                .await
            })
            .await
            .map_err(|e| map_pool_error("Failed to update agent timestamp", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent {org}/{project}/{name}")));
        }
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &CallContext,
        org: &str,
        project: &str,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let result = self
            .pool
            .run(ctx, "db.DeleteAgent", move |pool| async move {
                sqlx::query(
                    r#"
                    UPDATE agents SET deleted_at = NOW()
                    WHERE org_name = $1 AND project_name = $2 AND name = $3
                      AND deleted_at IS NULL
                    "#,
                )
                .bind(org)
                .bind(project)
                .bind(name)
                .execute(&pool)
                .await
            })
            .await
            .map_err(|e| map_pool_error("Failed to delete agent", e))?;

        Ok(result.rows_affected() > 0)
    }
}
