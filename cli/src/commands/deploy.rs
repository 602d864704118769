// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy command

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::collections::BTreeMap;

use agent_manager_core::application::{AgentOrchestrationService, DeployRequest};
use agent_manager_core::domain::platform_config::PlatformConfigManifest;

use super::{orchestration_service, print_json, AgentArgs, Session};

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: AgentArgs,

    /// Container image to roll out
    #[arg(long)]
    pub image: String,

    /// Environment variable for the workload (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

pub async fn handle_command(
    args: DeployArgs,
    config: &PlatformConfigManifest,
    session: &Session,
) -> Result<()> {
    let ctx = session.context();
    let service = orchestration_service(&ctx, config).await?;

    let request = DeployRequest {
        image: args.image,
        env: args.env.into_iter().collect::<BTreeMap<_, _>>(),
    };
    if !session.json {
        println!(
            "Deploying {} with image {}",
            args.target.agent.bold(),
            request.image
        );
    }

    let outcome = service
        .deploy_agent(&ctx, &session.org, &args.target.project, &args.target.agent, request)
        .await?;

    if session.json {
        return print_json(&outcome);
    }
    println!("{}", format!("✓ Workload updated: {}", outcome.workload).green());
    match &outcome.environment {
        Some(environment) => println!("  Rolling out to: {}", environment.bold()),
        None => println!(
            "{}",
            "  Could not determine the pipeline's first environment".yellow()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_var() {
        assert_eq!(
            parse_env_var("MODEL=gpt=4").unwrap(),
            ("MODEL".to_string(), "gpt=4".to_string())
        );
        assert_eq!(parse_env_var("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_env_var("=value").is_err());
        assert!(parse_env_var("novalue").is_err());
    }
}
