// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::agent::AgentId;
use crate::domain::envelope::{EnvelopeId, SessionId};
use crate::domain::execution::{ExecutionId, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentRegistered {
        agent_id: AgentId,
        capabilities: Vec<String>,
        registered_at: DateTime<Utc>,
    },
    AgentUnregistered {
        agent_id: AgentId,
        unregistered_at: DateTime<Utc>,
    },
    AgentActivityChanged {
        agent_id: AgentId,
        active: bool,
        changed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageEvent {
    MessageDelivered {
        envelope_id: EnvelopeId,
        session_id: SessionId,
        from: AgentId,
        to: AgentId,
        attempts: u32,
        delivered_at: DateTime<Utc>,
    },
    MessageFailed {
        envelope_id: EnvelopeId,
        session_id: SessionId,
        from: AgentId,
        to: AgentId,
        attempts: u32,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        started_at: DateTime<Utc>,
    },
    StageCompleted {
        execution_id: ExecutionId,
        stage: Stage,
        success: bool,
        completed_at: DateTime<Utc>,
    },
    StageFailed {
        execution_id: ExecutionId,
        stage: Stage,
        error: String,
        failed_at: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: ExecutionId,
        step_id: String,
        agent_id: AgentId,
        completed_at: DateTime<Utc>,
    },
    StepFailed {
        execution_id: ExecutionId,
        step_id: String,
        agent_id: AgentId,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        success: bool,
        completed_at: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ExecutionId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::StageCompleted { execution_id, .. }
            | ExecutionEvent::StageFailed { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::ExecutionFailed { execution_id, .. } => *execution_id,
        }
    }
}
