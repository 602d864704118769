// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the agent-manager CLI

pub mod build;
pub mod config;
pub mod delete;
pub mod deploy;
pub mod deployments;

pub use self::build::BuildCommand;
pub use self::config::ConfigCommand;
pub use self::delete::DeleteArgs;
pub use self::deploy::DeployArgs;
pub use self::deployments::DeploymentsCommand;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use agent_manager_core::application::StandardAgentOrchestrationService;
use agent_manager_core::domain::call_context::CallContext;
use agent_manager_core::domain::platform_config::PlatformConfigManifest;
use agent_manager_core::infrastructure::control_plane::HttpControlPlaneClient;
use agent_manager_core::infrastructure::db::RetryingPool;
use agent_manager_core::infrastructure::repositories::PostgresAgentRepository;
use agent_manager_core::infrastructure::transient::{control_plane_policy, pool_policy};

/// Flags shared by every command that talks to the control plane.
pub struct Session {
    pub org: String,
    pub json: bool,
    pub timeout: Option<Duration>,
}

impl Session {
    /// Call context cancelled on `Ctrl-C` and bounded by `--timeout`.
    pub fn context(&self) -> CallContext {
        let ctx = match self.timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::new(),
        };
        let on_interrupt = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight requests");
                on_interrupt.cancel();
            }
        });
        ctx
    }
}

#[derive(Args)]
pub struct AgentArgs {
    /// Project the agent belongs to
    #[arg(short, long, env = "AGENT_MANAGER_PROJECT")]
    pub project: String,

    /// Agent name
    #[arg(value_name = "AGENT")]
    pub agent: String,
}

/// Wires the orchestration service from configuration. The agent store is
/// only consulted when a database URL is configured.
pub async fn orchestration_service(
    ctx: &CallContext,
    config: &PlatformConfigManifest,
) -> Result<StandardAgentOrchestrationService> {
    let spec = &config.spec;
    if spec.control_plane.url.is_empty() {
        anyhow::bail!(
            "No control plane URL configured. Set spec.controlPlane.url or AGENT_MANAGER_CONTROL_PLANE_URL"
        );
    }

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let client = HttpControlPlaneClient::from_config(&spec.control_plane, &spec.http, Arc::new(http));
    let mut service = StandardAgentOrchestrationService::new(Arc::new(client))
        .with_policy(control_plane_policy(&spec.control_plane.retry));

    if let Some(url) = &spec.database.url {
        info!("Connecting to agent store");
        let pool = RetryingPool::connect(
            ctx,
            url,
            spec.database.max_connections,
            pool_policy(&spec.database.retry),
        )
        .await
        .context("Failed to connect to agent store")?;
        service = service.with_agent_repository(Arc::new(PostgresAgentRepository::new(pool)));
    }

    Ok(service)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", rendered);
    Ok(())
}
