// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Registry
//!
//! Tracks the agents known to a swarm, their capability sets, activity flags
//! and delivery handlers. Agent ids are unique at any instant.
//!
//! Lookups are answered in registration order so that capability resolution
//! is deterministic. Lifecycle events are published after the registry lock
//! has been released.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Owns the only mutable agent state shared by router and executor

use aegis_core::domain::agent::{Agent, AgentId};
use aegis_core::domain::errors::CoordinationError;
use aegis_core::domain::events::AgentLifecycleEvent;
use aegis_core::domain::handler::AgentHandler;
use aegis_core::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct RegisteredAgent {
    agent: Agent,
    handler: Arc<dyn AgentHandler>,
}

#[derive(Default)]
struct RegistryState {
    agents: HashMap<AgentId, RegisteredAgent>,
    order: Vec<AgentId>,
}

pub struct AgentRegistry {
    state: RwLock<RegistryState>,
    event_bus: EventBus,
}

impl AgentRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            event_bus,
        }
    }

    /// Register a new agent as active. Fails if the id is already taken.
    pub fn register<I, S>(
        &self,
        id: impl Into<AgentId>,
        capabilities: I,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<Agent, CoordinationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agent = Agent::new(id.into(), capabilities);

        {
            let mut state = self.state.write();
            if state.agents.contains_key(&agent.id) {
                return Err(CoordinationError::AlreadyRegistered(agent.id));
            }
            state.order.push(agent.id.clone());
            state.agents.insert(
                agent.id.clone(),
                RegisteredAgent {
                    agent: agent.clone(),
                    handler,
                },
            );
        }

        info!(
            agent_id = %agent.id,
            capabilities = ?agent.capabilities,
            "Agent registered"
        );
        self.event_bus
            .publish_agent_event(AgentLifecycleEvent::AgentRegistered {
                agent_id: agent.id.clone(),
                capabilities: agent.capabilities.iter().cloned().collect(),
                registered_at: agent.registered_at,
            });

        Ok(agent)
    }

    /// Remove an agent. Returns `false` when the id was not registered.
    pub fn unregister(&self, id: &AgentId) -> bool {
        let removed = {
            let mut state = self.state.write();
            let removed = state.agents.remove(id).is_some();
            if removed {
                state.order.retain(|existing| existing != id);
            }
            removed
        };

        if removed {
            info!(agent_id = %id, "Agent unregistered");
            self.event_bus
                .publish_agent_event(AgentLifecycleEvent::AgentUnregistered {
                    agent_id: id.clone(),
                    unregistered_at: Utc::now(),
                });
        } else {
            debug!(agent_id = %id, "Unregister ignored, agent not registered");
        }
        removed
    }

    /// Active agents offering `capability`, in registration order
    pub fn lookup(&self, capability: &str) -> Vec<Agent> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.agents.get(id))
            .filter(|entry| entry.agent.active && entry.agent.has_capability(capability))
            .map(|entry| entry.agent.clone())
            .collect()
    }

    /// Flip the activity flag. Unknown ids fail with `TargetNotFound`.
    pub fn set_active(&self, id: &AgentId, active: bool) -> Result<(), CoordinationError> {
        let changed = {
            let mut state = self.state.write();
            let entry = state
                .agents
                .get_mut(id)
                .ok_or_else(|| CoordinationError::TargetNotFound(id.clone()))?;
            let changed = entry.agent.active != active;
            entry.agent.active = active;
            changed
        };

        if changed {
            info!(agent_id = %id, active, "Agent activity changed");
            self.event_bus
                .publish_agent_event(AgentLifecycleEvent::AgentActivityChanged {
                    agent_id: id.clone(),
                    active,
                    changed_at: Utc::now(),
                });
        }
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<Agent> {
        self.state.read().agents.get(id).map(|entry| entry.agent.clone())
    }

    /// Agent record and handler in one read, as needed for a delivery attempt
    pub fn handler_for(&self, id: &AgentId) -> Option<(Agent, Arc<dyn AgentHandler>)> {
        self.state
            .read()
            .agents
            .get(id)
            .map(|entry| (entry.agent.clone(), Arc::clone(&entry.handler)))
    }

    /// All agents in registration order, active or not
    pub fn list(&self) -> Vec<Agent> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.agents.get(id))
            .map(|entry| entry.agent.clone())
            .collect()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.state.read().agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().agents.is_empty()
    }
}
