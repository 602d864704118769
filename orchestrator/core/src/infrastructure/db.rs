// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a `RetryingPool` that can be injected
//! into PostgreSQL repository implementations. Every entry point (connect,
//! prepare, execute, fetch, begin) runs through the shared retry executor with
//! the connection-pool classifier, so a dropped connection or an exhausted
//! pool is retried before the repository ever sees an error.
//!
//! Statements run inside a transaction returned by [`RetryingPool::begin`]
//! are not retried individually.

use std::future::Future;

use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult, PgRow, PgStatement};
use sqlx::{Executor, Postgres, Statement, Transaction};
use thiserror::Error;

use crate::domain::call_context::{CallContext, Interrupted};
use crate::domain::retry::RetryPolicy;
use crate::infrastructure::retry;
use crate::infrastructure::transient::default_pool_policy;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[derive(Clone)]
pub struct RetryingPool {
    pool: PgPool,
    policy: RetryPolicy<PoolError>,
}

impl RetryingPool {
    pub fn new(pool: PgPool, policy: RetryPolicy<PoolError>) -> Self {
        Self { pool, policy }
    }

    /// Opens a pool and verifies it with one connection, retrying both.
    pub async fn connect(
        ctx: &CallContext,
        connection_string: &str,
        max_connections: u32,
        policy: RetryPolicy<PoolError>,
    ) -> Result<Self, PoolError> {
        let pool = retry::execute(ctx, "db.Open", &policy, move || async move {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(connection_string)
                .await?;
            Ok(pool)
        })
        .await?;
        Ok(Self::new(pool, policy))
    }

    pub async fn connect_default(
        ctx: &CallContext,
        connection_string: &str,
    ) -> Result<Self, PoolError> {
        Self::connect(ctx, connection_string, 5, default_pool_policy()).await
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy<PoolError> {
        &self.policy
    }

    /// Runs `op` against the pool with retries. `op` is called once per
    /// attempt and must rebuild its query each time.
    pub async fn run<T, F, Fut>(&self, ctx: &CallContext, operation: &str, mut op: F) -> Result<T, PoolError>
    where
        F: FnMut(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        retry::execute(ctx, operation, &self.policy, || {
            let attempt = op(self.pool.clone());
            async move { attempt.await.map_err(PoolError::from) }
        })
        .await
    }

    pub async fn execute(&self, ctx: &CallContext, sql: &str) -> Result<PgQueryResult, PoolError> {
        self.run(ctx, "db.Exec", move |pool| async move { pool.execute(sql).await })
            .await
    }

    pub async fn fetch_all(&self, ctx: &CallContext, sql: &str) -> Result<Vec<PgRow>, PoolError> {
        self.run(ctx, "db.Query", move |pool| async move { pool.fetch_all(sql).await })
            .await
    }

    pub async fn fetch_optional(
        &self,
        ctx: &CallContext,
        sql: &str,
    ) -> Result<Option<PgRow>, PoolError> {
        self.run(ctx, "db.QueryRow", move |pool| async move {
            pool.fetch_optional(sql).await
        })
        .await
    }

    pub async fn prepare(
        &self,
        ctx: &CallContext,
        sql: &str,
    ) -> Result<PgStatement<'static>, PoolError> {
        self.run(ctx, "db.Prepare", move |pool| async move {
            let statement = pool.prepare(sql).await?;
            Ok(Statement::to_owned(&statement))
        })
        .await
    }

    pub async fn begin(&self, ctx: &CallContext) -> Result<Transaction<'static, Postgres>, PoolError> {
        self.run(ctx, "db.BeginTx", move |pool| async move { pool.begin().await })
            .await
    }
}
