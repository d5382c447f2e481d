// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Envelopes
//!
//! An [`Envelope`] wraps one logical delivery (all of its retry attempts).
//! It is created per `send_message` call and dropped once the delivery
//! resolves; envelopes are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::pipeline::{Plan, Step, StepOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeId(pub Uuid);

impl EnvelopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlates every envelope sent on behalf of one caller interaction
/// (e.g. all stage calls of a single pipeline execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed payload carried by an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    CreatePlan {
        task: Value,
    },
    ExecuteStep {
        step: Step,
    },
    Synthesize {
        step_outputs: Vec<StepOutput>,
        plan: Plan,
    },
    CapabilityRequest {
        capability: String,
        #[serde(default)]
        params: Value,
    },
    Custom {
        #[serde(default)]
        payload: Value,
    },
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::CreatePlan { .. } => "create_plan",
            AgentMessage::ExecuteStep { .. } => "execute_step",
            AgentMessage::Synthesize { .. } => "synthesize",
            AgentMessage::CapabilityRequest { .. } => "capability_request",
            AgentMessage::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub session_id: SessionId,
    pub from: AgentId,
    pub to: AgentId,
    pub payload: AgentMessage,
    #[serde(default)]
    pub context: Value,
    pub created_at: DateTime<Utc>,
    /// Number of retries performed so far (0 on the first attempt).
    pub retry_count: u32,
}

impl Envelope {
    pub fn new(
        session_id: SessionId,
        from: AgentId,
        to: AgentId,
        payload: AgentMessage,
        context: Value,
    ) -> Self {
        Self {
            id: EnvelopeId::new(),
            session_id,
            from,
            to,
            payload,
            context,
            created_at: Utc::now(),
            retry_count: 0,
        }
    }

    /// 1-based attempt number of the current delivery attempt.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }
}
