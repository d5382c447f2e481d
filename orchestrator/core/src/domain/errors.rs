// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Error Taxonomy
//!
//! | Error | Raised by | Propagation |
//! |-------|-----------|-------------|
//! | [`CoordinationError`] | registry, resolver, router | returned to the immediate caller |
//! | [`AgentError`] | agent handlers | wrapped into `CoordinationError::HandlerError` |
//! | [`StageFailure`] | stage executor | encoded in the pipeline result, never returned |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::AgentId;

/// Registry and delivery errors. These are programmer-facing: they signal a
/// misconfigured swarm or an unreachable target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    #[error("Agent already registered: {0}")]
    AlreadyRegistered(AgentId),

    #[error("Target agent not found: {0}")]
    TargetNotFound(AgentId),

    #[error("Target agent is inactive: {0}")]
    TargetInactive(AgentId),

    #[error("Delivery to {agent_id} timed out after {timeout_ms}ms")]
    DeliveryTimeout { agent_id: AgentId, timeout_ms: u64 },

    #[error("Handler of {agent_id} failed: {message}")]
    HandlerError { agent_id: AgentId, message: String },

    #[error("No active agent offers capability '{0}'")]
    NoCapableAgent(String),
}

impl CoordinationError {
    /// Timeouts and handler failures are retried; everything else fails fast.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinationError::DeliveryTimeout { .. } | CoordinationError::HandlerError { .. }
        )
    }
}

/// Rejection returned by an agent handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unsupported message kind: {0}")]
    Unsupported(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn failed(message: impl Into<String>) -> Self {
        AgentError::Failed(message.into())
    }
}

/// Pipeline-level failure kinds, recorded in stage results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    #[error("Planning failed: {message}")]
    PlanningFailure { message: String },

    #[error("Step {step_id} failed: {message}")]
    StepFailure { step_id: String, message: String },

    #[error("Synthesis failed: {message}")]
    SynthesisFailure { message: String },
}
