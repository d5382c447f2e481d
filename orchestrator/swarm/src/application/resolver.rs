// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Capability Resolver
//!
//! Picks the first active agent (registration order) offering a capability.
//! There is no load balancing.

use aegis_core::domain::agent::Agent;
use aegis_core::domain::errors::CoordinationError;
use std::sync::Arc;
use tracing::debug;

use crate::application::registry::AgentRegistry;

#[derive(Clone)]
pub struct CapabilityResolver {
    registry: Arc<AgentRegistry>,
}

impl CapabilityResolver {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, capability: &str) -> Result<Agent, CoordinationError> {
        let agent = self
            .registry
            .lookup(capability)
            .into_iter()
            .next()
            .ok_or_else(|| CoordinationError::NoCapableAgent(capability.to_string()))?;

        debug!(capability, agent_id = %agent.id, "Resolved capability");
        Ok(agent)
    }
}
