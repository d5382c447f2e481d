// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pipeline Execution Aggregate
//!
//! Status machine:
//!
//! ```text
//! Initiated → Planning → Executing → Synthesizing → Completed
//!     └──────────┴───────────┴─────────────┴──────→ Failed
//! ```
//!
//! Transitions only move forward; `Completed` and `Failed` are absorbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::pipeline::{Plan, StepOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Initiated,
    Planning,
    Executing,
    Synthesizing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Initiated => 0,
            ExecutionStatus::Planning => 1,
            ExecutionStatus::Executing => 2,
            ExecutionStatus::Synthesizing => 3,
            ExecutionStatus::Completed | ExecutionStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Initiated => "INITIATED",
            ExecutionStatus::Planning => "PLANNING",
            ExecutionStatus::Executing => "EXECUTING",
            ExecutionStatus::Synthesizing => "SYNTHESIZING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Pipeline stage names, used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Execution,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Planning => f.write_str("planning"),
            Stage::Execution => f.write_str("execution"),
            Stage::Synthesis => f.write_str("synthesis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningStage {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Step-isolated execution stage.
///
/// `success` is true when at least one step produced an output, so a stage
/// where every step failed reports `false` even though all outputs exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStage {
    pub success: bool,
    pub steps_executed: usize,
    pub outputs: Vec<StepOutput>,
    pub duration_ms: u64,
}

impl ExecutionStage {
    pub fn from_outputs(outputs: Vec<StepOutput>, duration_ms: u64) -> Self {
        Self {
            success: outputs.iter().any(|o| !o.is_error()),
            steps_executed: outputs.len(),
            outputs,
            duration_ms,
        }
    }

    pub fn failed_steps(&self) -> usize {
        self.outputs.iter().filter(|o| o.is_error()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisStage {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fallback: bool,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StageResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning: Option<PlanningStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisStage>,
}

impl StageResults {
    /// `planning.success && execution.success`; synthesis never participates.
    pub fn overall_success(&self) -> bool {
        let planning = self.planning.as_ref().is_some_and(|p| p.success);
        let execution = self.execution.as_ref().is_some_and(|e| e.success);
        planning && execution
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub task: Value,
    pub context: Value,
    pub stages: StageResults,
    status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Execution {
    pub fn new(task: Value, context: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            task,
            context,
            stages: StageResults::default(),
            status: ExecutionStatus::Initiated,
            created_at: now,
            updated_at: now,
            ended_at: None,
            error: None,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn transition_to(&mut self, next: ExecutionStatus) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(next) {
            return Err(ExecutionError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.ended_at = Some(self.updated_at);
        }
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Completed)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Value returned by `StageExecutor::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub execution_id: ExecutionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub stages: StageResults,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::Step;
    use serde_json::json;

    #[test]
    fn test_forward_transitions() {
        let mut execution = Execution::new(json!({"task": "demo"}), Value::Null);
        assert_eq!(execution.status(), ExecutionStatus::Initiated);

        execution.transition_to(ExecutionStatus::Planning).unwrap();
        execution.transition_to(ExecutionStatus::Executing).unwrap();
        execution.transition_to(ExecutionStatus::Synthesizing).unwrap();
        execution.complete().unwrap();

        assert_eq!(execution.status(), ExecutionStatus::Completed);
        assert!(execution.ended_at.is_some());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut execution = Execution::new(Value::Null, Value::Null);
        execution.transition_to(ExecutionStatus::Executing).unwrap();

        let err = execution.transition_to(ExecutionStatus::Planning).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::IllegalTransition {
                from: ExecutionStatus::Executing,
                to: ExecutionStatus::Planning,
            }
        );
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut execution = Execution::new(Value::Null, Value::Null);
        execution.fail("planner unreachable").unwrap();

        assert!(execution.complete().is_err());
        assert!(execution.fail("again").is_err());
        assert_eq!(execution.error.as_deref(), Some("planner unreachable"));
    }

    #[test]
    fn test_execution_stage_success_needs_one_output() {
        let step = Step::new("s1", "worker", Value::Null);

        let all_failed = ExecutionStage::from_outputs(
            vec![StepOutput::failed(&step, "a"), StepOutput::failed(&step, "b")],
            0,
        );
        assert!(!all_failed.success);
        assert_eq!(all_failed.steps_executed, 2);

        let one_ok = ExecutionStage::from_outputs(
            vec![StepOutput::failed(&step, "a"), StepOutput::succeeded(&step, json!(1))],
            0,
        );
        assert!(one_ok.success);
        assert_eq!(one_ok.failed_steps(), 1);

        assert!(!ExecutionStage::from_outputs(vec![], 0).success);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        assert_eq!(serde_json::to_value(ExecutionStatus::Synthesizing).unwrap(), json!("SYNTHESIZING"));
    }

    #[test]
    fn test_is_fallback_omitted_when_false() {
        let stage = SynthesisStage {
            success: true,
            agent_id: Some(AgentId::from("synth")),
            is_fallback: false,
            result: json!({"result": "ok"}),
            error: None,
            duration_ms: 3,
        };
        let value = serde_json::to_value(&stage).unwrap();
        assert!(value.get("isFallback").is_none());
    }
}
