// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use agent_manager_core::domain::platform_config::{PlatformConfigManifest, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./agent-manager.yaml)
        #[arg(short, long, default_value = "./agent-manager.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = PlatformConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  --config flag: {}", path.display()),
            None => println!("  --config flag: {}", "(not set)".dimmed()),
        }
        for (index, path) in PlatformConfigManifest::search_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", index + 1, path.display(), marker);
        }
        if std::env::var(CONFIG_PATH_ENV).is_err() {
            println!("  {}: {}", CONFIG_PATH_ENV, "(not set)".dimmed());
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Control Plane:".bold());
    if spec.control_plane.url.is_empty() {
        println!("  URL: {}", "(not set)".yellow());
    } else {
        println!("  URL: {}", spec.control_plane.url);
    }
    println!(
        "  Token: {}",
        if spec.control_plane.token.is_some() { "(set)" } else { "(none)" }
    );
    println!(
        "  Retries: {} (backoff {:?})",
        spec.control_plane.retry.max_retries,
        spec.control_plane.retry.backoff()
    );
    println!();

    println!("{}", "HTTP:".bold());
    println!("  Retries: {}", spec.http.max_retries);
    println!("  Wait: {:?} - {:?}", spec.http.wait_min, spec.http.wait_max);
    println!("  Attempt timeout: {:?}", spec.http.attempt_timeout);
    println!();

    println!("{}", "Agent Store:".bold());
    match &spec.database.url {
        Some(_) => println!("  Database: configured"),
        None => println!("  Database: {}", "(disabled)".dimmed()),
    }
    println!("  Max connections: {}", spec.database.max_connections);
    println!(
        "  Retries: {} (backoff {:?})",
        spec.database.retry.max_retries,
        spec.database.retry.backoff()
    );
    println!();

    println!("{}", "Logging:".bold());
    println!("  Level: {}", spec.logging.level);
    println!("  Format: {}", spec.logging.format);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PlatformConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }

    let mut sample = PlatformConfigManifest::default();
    sample.spec.control_plane.url = "http://localhost:8080".to_string();
    sample
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
