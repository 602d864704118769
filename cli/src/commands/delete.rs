// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delete command

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use agent_manager_core::application::AgentOrchestrationService;
use agent_manager_core::domain::platform_config::PlatformConfigManifest;

use super::{orchestration_service, print_json, AgentArgs, Session};

#[derive(Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: AgentArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn handle_command(
    args: DeleteArgs,
    config: &PlatformConfigManifest,
    session: &Session,
) -> Result<()> {
    if !args.yes {
        anyhow::bail!(
            "Deleting '{}' removes its builds and workloads; pass --yes to confirm",
            args.target.agent
        );
    }

    let ctx = session.context();
    let service = orchestration_service(&ctx, config).await?;
    service
        .delete_agent(&ctx, &session.org, &args.target.project, &args.target.agent)
        .await?;

    if session.json {
        return print_json(&serde_json::json!({ "deleted": args.target.agent }));
    }
    println!("{}", format!("✓ Agent deleted: {}", args.target.agent).green());
    Ok(())
}
