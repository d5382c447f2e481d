// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pipeline Value Objects
//!
//! Types exchanged between the stage executor and pipeline agents:
//!
//! - [`Plan`] / [`Step`]: produced once by the planning agent, immutable afterwards.
//! - [`StepOutput`]: one per executed step, appended in plan order.
//! - [`FallbackSynthesis`]: locally computed summary used when the synthesis
//!   agent is unavailable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::agent::AgentId;

/// Ordered list of steps returned by the planning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub target_agent_id: AgentId,
    #[serde(default)]
    pub payload: Value,
}

impl Step {
    pub fn new(id: impl Into<String>, target: impl Into<AgentId>, payload: Value) -> Self {
        Self {
            id: id.into(),
            target_agent_id: target.into(),
            payload,
        }
    }
}

/// Result of a single plan step. Exactly one of `output` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub step_id: String,
    pub agent_id: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StepOutput {
    pub fn succeeded(step: &Step, output: Value) -> Self {
        Self {
            step_id: step.id.clone(),
            agent_id: step.target_agent_id.clone(),
            output: Some(output),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(step: &Step, error: impl Into<String>) -> Self {
        Self {
            step_id: step.id.clone(),
            agent_id: step.target_agent_id.clone(),
            output: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Deterministic summary built from step outputs when synthesis fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackSynthesis {
    pub summary: String,
    pub succeeded: Vec<StepOutput>,
    pub failed: Vec<StepOutput>,
}

impl FallbackSynthesis {
    pub fn from_outputs(outputs: &[StepOutput]) -> Self {
        let (failed, succeeded): (Vec<StepOutput>, Vec<StepOutput>) =
            outputs.iter().cloned().partition(StepOutput::is_error);

        let summary = format!(
            "Synthesis unavailable; {} step(s) succeeded, {} step(s) failed",
            succeeded.len(),
            failed.len()
        );

        Self {
            summary,
            succeeded,
            failed,
        }
    }
}
