// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Agent Manager CLI
//!
//! The `agent-manager` binary drives agents through the control plane.
//!
//! ## Commands
//!
//! - `agent-manager build trigger|list|get` - Agent builds
//! - `agent-manager deploy` - Roll a new image onto the agent's workload
//! - `agent-manager deployments list|endpoints|env` - Per-environment deployment status
//! - `agent-manager delete` - Remove an agent and everything built for it
//! - `agent-manager config show|validate|generate` - Configuration management
//!
//! Every control-plane call is retried on transient failures. `Ctrl-C` and
//! `--timeout` abort the retry loop at the next suspension point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use agent_manager_core::domain::platform_config::PlatformConfigManifest;

mod commands;

use commands::{BuildCommand, ConfigCommand, DeleteArgs, DeployArgs, DeploymentsCommand};

/// Agent Manager - build, deploy and inspect agents on the control plane
#[derive(Parser)]
#[command(name = "agent-manager")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AGENT_MANAGER_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Organization owning the agents
    #[arg(long, global = true, env = "AGENT_MANAGER_ORG", default_value = "default")]
    org: String,

    /// Overall deadline for the command, in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent builds
    #[command(name = "build")]
    Build {
        #[command(subcommand)]
        command: BuildCommand,
    },

    /// Deploy a new image for an agent
    #[command(name = "deploy")]
    Deploy(DeployArgs),

    /// Agent deployments across environments
    #[command(name = "deployments")]
    Deployments {
        #[command(subcommand)]
        command: DeploymentsCommand,
    },

    /// Delete an agent with its builds and workloads
    #[command(name = "delete")]
    Delete(DeleteArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    // Config commands report load failures themselves
    if let Commands::Config { command } = command {
        init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
        return commands::config::handle_command(command, cli.config).await;
    }

    let config = PlatformConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.spec.logging.level.clone());
    init_logging(&level, &config.spec.logging.format)?;

    let session = commands::Session {
        org: cli.org,
        json: cli.json,
        timeout: cli.timeout.map(Duration::from_secs),
    };

    match command {
        Commands::Build { command } => commands::build::handle_command(command, &config, &session).await,
        Commands::Deploy(args) => commands::deploy::handle_command(args, &config, &session).await,
        Commands::Deployments { command } => {
            commands::deployments::handle_command(command, &config, &session).await
        }
        Commands::Delete(args) => commands::delete::handle_command(args, &config, &session).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
