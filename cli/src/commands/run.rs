// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `aegis run` - execute the demo pipeline in-process
//!
//! Loads the swarm configuration, registers the demo agents, runs one
//! pipeline execution and prints the `PipelineResult` as JSON on stdout.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use aegis_core::domain::config::SwarmConfigManifest;
use aegis_swarm::application::SwarmCoordinator;

use crate::demo::{register_demo_agents, DemoOptions};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Task text handed to the planning agent
    #[arg(long)]
    pub task: String,

    /// Number of steps the demo planner produces
    #[arg(long, default_value_t = 2)]
    pub steps: usize,

    /// 1-based step index the demo worker rejects
    #[arg(long, value_name = "K")]
    pub fail_step: Option<usize>,

    /// Do not register a synthesis agent (forces the fallback summary)
    #[arg(long)]
    pub no_synth: bool,

    /// Optional JSON context passed to every agent
    #[arg(long, value_name = "JSON")]
    pub context: Option<String>,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = SwarmConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    let context: Value = match &args.context {
        Some(raw) => serde_json::from_str(raw).context("--context must be valid JSON")?,
        None => Value::Null,
    };

    let coordinator = SwarmCoordinator::init(manifest.spec).context("Failed to initialize swarm")?;
    register_demo_agents(
        &coordinator,
        &DemoOptions {
            steps: args.steps,
            fail_step: args.fail_step,
            with_synthesizer: !args.no_synth,
        },
    )
    .context("Failed to register demo agents")?;

    info!(task = %args.task, steps = args.steps, "Running demo pipeline");
    let outcome = coordinator
        .execute(serde_json::json!({ "task": args.task }), context)
        .await;

    // The sweeper must stop even when execution failed structurally
    coordinator.shutdown().await.context("Failed to shut down swarm")?;
    let result = outcome.context("Pipeline execution failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        eprintln!("{}", format!("✓ Execution {} succeeded", result.execution_id).green());
    } else {
        eprintln!("{}", format!("✗ Execution {} failed", result.execution_id).red());
    }

    Ok(())
}
