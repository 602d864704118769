// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Build commands
//!
//! Commands: trigger, list, get

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use agent_manager_core::application::{
    AgentOrchestrationService, BuildDetails, BuildSummary,
};
use agent_manager_core::domain::build_status::BuildStatusLabel;
use agent_manager_core::domain::platform_config::PlatformConfigManifest;

use super::{orchestration_service, print_json, AgentArgs, Session};

#[derive(Subcommand)]
pub enum BuildCommand {
    /// Start a build of the agent's source
    Trigger {
        #[command(flatten)]
        target: AgentArgs,

        /// Commit to build (default: branch head)
        #[arg(long)]
        commit: Option<String>,
    },

    /// List the agent's builds, newest first
    List {
        #[command(flatten)]
        target: AgentArgs,
    },

    /// Show build progress and steps
    Get {
        #[command(flatten)]
        target: AgentArgs,

        /// Build name
        #[arg(value_name = "BUILD")]
        build: String,
    },
}

pub async fn handle_command(
    command: BuildCommand,
    config: &PlatformConfigManifest,
    session: &Session,
) -> Result<()> {
    let ctx = session.context();
    let service = orchestration_service(&ctx, config).await?;
    let org = session.org.as_str();

    match command {
        BuildCommand::Trigger { target, commit } => {
            let build = service
                .trigger_build(&ctx, org, &target.project, &target.agent, commit.as_deref())
                .await?;
            if session.json {
                return print_json(&build);
            }
            println!("{}", format!("✓ Build triggered: {}", build.name).green());
            Ok(())
        }
        BuildCommand::List { target } => {
            let builds = service
                .list_builds(&ctx, org, &target.project, &target.agent)
                .await?;
            if session.json {
                return print_json(&builds);
            }
            print_builds(&builds);
            Ok(())
        }
        BuildCommand::Get { target, build } => {
            let details = service
                .get_build(&ctx, org, &target.project, &target.agent, &build)
                .await?;
            if session.json {
                return print_json(&details);
            }
            print_details(&details);
            Ok(())
        }
    }
}

fn colored_status(status: &BuildStatusLabel) -> colored::ColoredString {
    match status {
        BuildStatusLabel::Completed => status.as_str().green(),
        BuildStatusLabel::Unknown => status.as_str().dimmed(),
        BuildStatusLabel::Reason(reason) if reason.contains("Failed") => reason.red(),
        BuildStatusLabel::Reason(reason) => reason.yellow(),
    }
}

fn print_builds(builds: &[BuildSummary]) {
    if builds.is_empty() {
        println!("{}", "No builds found".yellow());
        return;
    }

    println!("{:<32} {:<20} {:<12} {}", "NAME", "STATUS", "COMMIT", "STARTED");
    for build in builds {
        let commit: String = build.commit.chars().take(10).collect();
        println!(
            "{:<32} {:<20} {:<12} {}",
            build.name.bold(),
            colored_status(&build.status),
            commit,
            build.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn print_details(details: &BuildDetails) {
    let summary = &details.summary;
    println!("{}", summary.name.bold());
    println!("  Status:   {}", colored_status(&summary.status));
    println!("  Progress: {}%", details.percent_complete);
    if !summary.commit.is_empty() {
        println!("  Commit:   {}", summary.commit);
    }
    if !summary.image.is_empty() {
        println!("  Image:    {}", summary.image);
    }
    if let Some(seconds) = details.duration_seconds {
        println!("  Duration: {}s", seconds);
    }

    if details.steps.is_empty() {
        return;
    }
    println!();
    println!("{}", "Steps:".bold());
    for step in &details.steps {
        println!(
            "  {:<18} {:<8} {:<24} {}",
            step.condition_type,
            format!("{:?}", step.status),
            step.reason,
            step.at.format("%H:%M:%S")
        );
        if !step.message.is_empty() {
            println!("    {}", step.message.dimmed());
        }
    }
}
