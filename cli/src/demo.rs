// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Demo agents for `aegis run`
//!
//! - `planner` splits the task into `steps` steps targeting `worker`
//! - `worker` echoes each step payload as `{received: payload}`
//! - `synth` merges the step outputs into `{result: "ok", critiques: [...]}`

use aegis_core::domain::errors::{AgentError, CoordinationError};
use aegis_core::domain::handler::{PipelineAgent, PipelineAgentHandler};
use aegis_core::domain::pipeline::{Plan, Step, StepOutput};
use aegis_swarm::application::SwarmCoordinator;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const PLANNER_ID: &str = "planner";
pub const WORKER_ID: &str = "worker";
pub const SYNTH_ID: &str = "synth";

#[derive(Debug, Clone, Default)]
pub struct DemoOptions {
    pub steps: usize,
    /// 1-based index of a step the worker rejects
    pub fail_step: Option<usize>,
    pub with_synthesizer: bool,
}

pub struct DemoPlanner {
    steps: usize,
}

#[async_trait]
impl PipelineAgent for DemoPlanner {
    async fn create_plan(&self, task: &Value, _context: &Value, _cancel: CancellationToken) -> Result<Plan, AgentError> {
        let steps = (1..=self.steps)
            .map(|n| {
                Step::new(
                    format!("step-{}", n),
                    WORKER_ID,
                    json!({ "task": task, "part": n, "of": self.steps }),
                )
            })
            .collect();
        Ok(Plan::new(steps))
    }
}

pub struct DemoWorker {
    fail_step: Option<usize>,
}

#[async_trait]
impl PipelineAgent for DemoWorker {
    async fn execute_step(&self, step: &Step, _context: &Value, cancel: CancellationToken) -> Result<Value, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if let Some(fail) = self.fail_step {
            if step.payload["part"] == json!(fail) {
                return Err(AgentError::failed(format!("{} rejected by demo worker", step.id)));
            }
        }
        Ok(json!({ "received": step.payload }))
    }
}

pub struct DemoSynthesizer;

#[async_trait]
impl PipelineAgent for DemoSynthesizer {
    async fn synthesize(
        &self,
        step_outputs: &[StepOutput],
        _plan: &Plan,
        _context: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value, AgentError> {
        let critiques: Vec<String> = step_outputs
            .iter()
            .filter_map(|output| output.error.as_ref().map(|e| format!("{}: {}", output.step_id, e)))
            .collect();
        Ok(json!({ "result": "ok", "critiques": critiques }))
    }
}

/// Register the demo agents on `coordinator`
pub fn register_demo_agents(coordinator: &SwarmCoordinator, options: &DemoOptions) -> Result<(), CoordinationError> {
    coordinator.register_agent(
        PLANNER_ID,
        [coordinator.config().executor.planning_capability.clone()],
        PipelineAgentHandler::shared(DemoPlanner { steps: options.steps }),
    )?;
    coordinator.register_agent(
        WORKER_ID,
        ["execution"],
        PipelineAgentHandler::shared(DemoWorker {
            fail_step: options.fail_step,
        }),
    )?;
    if options.with_synthesizer {
        coordinator.register_agent(
            SYNTH_ID,
            [coordinator.config().executor.synthesis_capability.clone()],
            PipelineAgentHandler::shared(DemoSynthesizer),
        )?;
    }
    Ok(())
}
