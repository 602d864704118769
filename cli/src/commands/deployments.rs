// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment status commands
//!
//! Commands: list, endpoints, env

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use agent_manager_core::application::{AgentOrchestrationService, DeploymentSummary};
use agent_manager_core::domain::deployment_status::DeploymentStatus;
use agent_manager_core::domain::platform_config::PlatformConfigManifest;

use super::{orchestration_service, print_json, AgentArgs, Session};

#[derive(Subcommand)]
pub enum DeploymentsCommand {
    /// Show the agent's status in every pipeline environment
    List {
        #[command(flatten)]
        target: AgentArgs,
    },

    /// Show the URLs the agent serves in one environment
    Endpoints {
        #[command(flatten)]
        target: AgentArgs,

        /// Environment name
        #[arg(short, long = "env")]
        environment: String,
    },

    /// Show the environment variables released to one environment
    Env {
        #[command(flatten)]
        target: AgentArgs,

        /// Environment name
        #[arg(short, long = "env")]
        environment: String,
    },
}

pub async fn handle_command(
    command: DeploymentsCommand,
    config: &PlatformConfigManifest,
    session: &Session,
) -> Result<()> {
    let ctx = session.context();
    let service = orchestration_service(&ctx, config).await?;

    match command {
        DeploymentsCommand::List { target } => {
            let deployments = service
                .list_deployments(&ctx, &session.org, &target.project, &target.agent)
                .await?;
            if session.json {
                return print_json(&deployments);
            }
            print_deployments(&deployments);
            Ok(())
        }
        DeploymentsCommand::Endpoints { target, environment } => {
            let endpoints = service
                .get_agent_endpoints(&ctx, &session.org, &target.project, &target.agent, &environment)
                .await?;
            if session.json {
                return print_json(&endpoints);
            }
            if endpoints.is_empty() {
                println!("{}", format!("No endpoints in {}", environment).yellow());
            }
            for endpoint in &endpoints {
                println!("{}", endpoint.url);
            }
            Ok(())
        }
        DeploymentsCommand::Env { target, environment } => {
            let variables = service
                .get_agent_configurations(&ctx, &session.org, &target.project, &target.agent, &environment)
                .await?;
            if session.json {
                return print_json(&variables);
            }
            if variables.is_empty() {
                println!("{}", format!("No environment variables in {}", environment).yellow());
            }
            for variable in &variables {
                println!("{}={}", variable.key.bold(), variable.value);
            }
            Ok(())
        }
    }
}

fn colored_status(status: DeploymentStatus) -> colored::ColoredString {
    match status {
        DeploymentStatus::Active => status.as_str().green(),
        DeploymentStatus::InProgress => status.as_str().yellow(),
        DeploymentStatus::Failed => status.as_str().red(),
        DeploymentStatus::Suspended => status.as_str().magenta(),
        DeploymentStatus::NotDeployed => status.as_str().dimmed(),
    }
}

fn print_deployments(deployments: &[DeploymentSummary]) {
    if deployments.is_empty() {
        println!("{}", "Deployment pipeline has no environments".yellow());
        return;
    }

    for deployment in deployments {
        let label = if deployment.environment_display_name.is_empty() {
            deployment.environment.as_str()
        } else {
            deployment.environment_display_name.as_str()
        };
        println!("{} {}", label.bold(), colored_status(deployment.status));

        if let Some(image) = &deployment.image_id {
            println!("  Image:    {}", image);
        }
        if let Some(at) = deployment.last_deployed_at {
            println!("  Deployed: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        for endpoint in &deployment.endpoints {
            println!("  Endpoint: {}", endpoint.url);
        }
        if let Some(target) = &deployment.promotion_target {
            let approval = if target.requires_approval {
                " (approval required)"
            } else {
                ""
            };
            println!("  Promotes to: {}{}", target.name, approval.dimmed());
        }
    }
}
