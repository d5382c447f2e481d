// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_core::domain::config::{SwarmConfigManifest, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file. An explicit path must exist; without one the
        /// discovered file is used, or defaults when none is found
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration manifest with default values
    Generate {
        /// Output path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
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
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let manifest = SwarmConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. {}", DEFAULT_CONFIG_FILE);
        println!();
    }

    if as_yaml {
        print!("{}", manifest.to_yaml()?);
        return Ok(());
    }

    let config = &manifest.spec;
    println!("{} {}", "Current configuration:".bold(), manifest.metadata.name);
    println!();

    println!("{}", "Router:".bold());
    println!("  Timeout: {}ms", config.router.timeout_ms);
    println!("  Max retries: {}", config.router.max_retries);
    println!("  Backoff base: {}ms", config.router.backoff_base_ms);
    println!();

    println!("{}", "Stage Executor:".bold());
    println!("  Executor id: {}", config.executor.executor_id);
    println!(
        "  Planning: capability '{}', timeout {}ms",
        config.executor.planning_capability, config.executor.planning_timeout_ms
    );
    println!("  Execution: timeout {}ms per step", config.executor.execution_timeout_ms);
    println!(
        "  Synthesis: capability '{}', timeout {}ms",
        config.executor.synthesis_capability, config.executor.synthesis_timeout_ms
    );
    println!();

    println!("{}", "Execution Store:".bold());
    println!("  TTL: {}ms", config.store.execution_ttl_ms);
    println!("  Max executions: {}", config.store.max_executions);
    println!("  Sweep interval: {}ms", config.store.sweep_interval_ms);
    println!();

    println!("{} {}", "Event bus capacity:".bold(), config.event_bus_capacity);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    // Loading applies env overrides and validates the result
    let manifest = SwarmConfigManifest::load_or_default(config_path)
        .context("Configuration validation failed")?;

    println!(
        "{} ({})",
        "✓ Configuration is valid".green(),
        manifest.metadata.name
    );

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    write_default_manifest(output)?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn write_default_manifest(output: &Path) -> Result<()> {
    let yaml = SwarmConfigManifest::default().to_yaml()?;
    std::fs::write(output, yaml)
        .with_context(|| format!("Failed to write config to {:?}", output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_manifest_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aegis-swarm.yaml");

        write_default_manifest(&path).unwrap();

        let manifest = SwarmConfigManifest::from_yaml_file(&path).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest.spec.router.max_retries, 3);
    }

    #[tokio::test]
    async fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aegis-swarm.yaml");
        std::fs::write(&path, "existing").unwrap();

        assert!(generate(&path, false).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing");

        generate(&path, true).await.unwrap();
        assert!(SwarmConfigManifest::from_yaml_file(&path).is_ok());
    }

    #[tokio::test]
    async fn test_validate_rejects_invalid_or_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aegis-swarm.yaml");
        let mut manifest = SwarmConfigManifest::default();
        manifest.spec.router.timeout_ms = 0;
        std::fs::write(&path, manifest.to_yaml().unwrap()).unwrap();

        assert!(validate(Some(path)).await.is_err());
        assert!(validate(Some(dir.path().join("missing.yaml"))).await.is_err());

        let valid = dir.path().join("valid.yaml");
        write_default_manifest(&valid).unwrap();
        assert!(validate(Some(valid)).await.is_ok());
    }
}
