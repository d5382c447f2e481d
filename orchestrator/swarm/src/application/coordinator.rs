// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Coordinator
//!
//! Owns one registry, store, event bus, router and stage executor and wires
//! them together. There is no process-global state: every coordinator is an
//! independent swarm.
//!
//! [`SwarmCoordinator::init`] starts the execution store sweeper and must be
//! called from within a Tokio runtime. [`SwarmCoordinator::shutdown`] stops it
//! and cancels in-flight delivery attempts; it must run before process exit.

use aegis_core::domain::agent::{Agent, AgentId};
use aegis_core::domain::config::{ConfigError, SwarmConfig};
use aegis_core::domain::errors::CoordinationError;
use aegis_core::domain::execution::{Execution, ExecutionId, PipelineResult};
use aegis_core::domain::handler::AgentHandler;
use aegis_core::infrastructure::event_bus::EventBus;
use aegis_core::infrastructure::execution_store::{ExecutionStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::registry::AgentRegistry;
use crate::application::router::MessageRouter;
use crate::application::stage_executor::{ExecutorError, StageExecutor};
use crate::domain::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SwarmCoordinator {
    config: SwarmConfig,
    event_bus: EventBus,
    registry: Arc<AgentRegistry>,
    router: Arc<MessageRouter>,
    store: Arc<ExecutionStore>,
    executor: StageExecutor,
}

impl SwarmCoordinator {
    pub fn init(config: SwarmConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_bus_capacity);
        let registry = Arc::new(AgentRegistry::new(event_bus.clone()));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            event_bus.clone(),
            RetryPolicy::from(&config.router),
            config.router.timeout(),
        ));
        let store = Arc::new(ExecutionStore::new(config.store.clone()));
        let executor = StageExecutor::new(
            Arc::clone(&router),
            Arc::clone(&registry),
            Arc::clone(&store),
            event_bus.clone(),
            config.executor.clone(),
        );

        store.start_sweeper()?;
        info!(
            max_retries = config.router.max_retries,
            timeout_ms = config.router.timeout_ms,
            max_executions = config.store.max_executions,
            "Swarm coordinator initialized"
        );

        Ok(Self {
            config,
            event_bus,
            registry,
            router,
            store,
            executor,
        })
    }

    pub fn register_agent<I, S>(
        &self,
        id: impl Into<AgentId>,
        capabilities: I,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<Agent, CoordinationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.register(id, capabilities, handler)
    }

    pub async fn execute(&self, task: Value, context: Value) -> Result<PipelineResult, ExecutorError> {
        self.executor.execute(task, context).await
    }

    pub fn get_execution(&self, id: ExecutionId) -> Option<Execution> {
        self.executor.get_execution(id)
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    pub fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    /// Stop the sweeper and cancel in-flight deliveries. Callable once.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.router.cancel_inflight();
        self.store.shutdown().await?;
        info!("Swarm coordinator shut down");
        Ok(())
    }
}
