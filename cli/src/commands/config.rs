// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use scopekeeper_core::domain::config::ScopeConfigManifest;

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

    /// Generate a configuration file holding the defaults
    Generate {
        /// Output path (default: ./scopekeeper-config.yaml)
        #[arg(short, long, default_value = "./scopekeeper-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config =
        ScopeConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SCOPEKEEPER_CONFIG_PATH: {}",
            std::env::var("SCOPEKEEPER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./scopekeeper-config.yaml");
        println!("  4. ~/.scopekeeper/config.yaml");
        println!("  5. /etc/scopekeeper/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Runtime:".bold());
    println!("  Name: {}", config.spec.runtime_name);
    match &config.spec.cluster {
        Some(cluster) => println!("  Zone: {}", cluster.zone),
        None => println!("  Zone: {}", "(standalone)".dimmed()),
    }
    println!();

    let conversation = &config.spec.conversation;
    println!("{}", "Conversations:".bold());
    println!("  Reaper period: {}s", conversation.reaper_period_seconds);
    match conversation.default_idle_timeout_seconds {
        Some(seconds) => println!("  Default idle timeout: {}s", seconds),
        None => println!("  Default idle timeout: {}", "(none)".dimmed()),
    }
    println!();

    let instantiation = &config.spec.instantiation;
    println!("{}", "Instantiation:".bold());
    println!("  Wait timeout: {}s", instantiation.wait_timeout_seconds);
    println!("  On timeout: {:?}", instantiation.timeout_policy());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ScopeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    ScopeConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
