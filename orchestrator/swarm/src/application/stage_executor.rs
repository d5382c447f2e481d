// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Stage Executor
//!
//! Runs the Plan → Execute → Synthesize pipeline for one task.
//!
//! ```text
//! INITIATED → PLANNING → EXECUTING → SYNTHESIZING → COMPLETED | FAILED
//!                 │
//!                 └── planning failure ─────────────────────→ FAILED
//! ```
//!
//! | Stage | Failure policy |
//! |-------|----------------|
//! | Planning | fatal: the execution fails, later stages never run |
//! | Execution | per step: the error is recorded and the next step runs |
//! | Synthesis | never fatal: a deterministic fallback summary is produced |
//!
//! Every stage call goes through the [`MessageRouter`], so router retries
//! apply before a stage outcome is decided. The stage timeout bounds the whole
//! call including retries and backoff. Steps run strictly in plan order.
//!
//! Each state change is written to the [`ExecutionStore`] before the event
//! describing it is published.
//!
//! `execute` only returns `Err` for structural problems (no agents
//! registered); pipeline outcomes are encoded in the [`PipelineResult`].

use aegis_core::domain::agent::AgentId;
use aegis_core::domain::config::ExecutorConfig;
use aegis_core::domain::envelope::{AgentMessage, SessionId};
use aegis_core::domain::errors::{CoordinationError, StageFailure};
use aegis_core::domain::events::ExecutionEvent;
use aegis_core::domain::execution::{
    Execution, ExecutionError, ExecutionId, ExecutionStage, ExecutionStatus, PipelineResult,
    PlanningStage, Stage, SynthesisStage,
};
use aegis_core::domain::pipeline::{FallbackSynthesis, Plan, StepOutput};
use aegis_core::infrastructure::event_bus::EventBus;
use aegis_core::infrastructure::execution_store::ExecutionStore;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::application::registry::AgentRegistry;
use crate::application::router::{DeliveryOptions, MessageRouter};

/// Error text recorded on an execution whose every step failed
pub const NO_STEP_SUCCEEDED: &str = "no execution step succeeded";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("No agents registered; the stage executor has nothing to delegate to")]
    NoAgentsConfigured,

    #[error(transparent)]
    IllegalState(#[from] ExecutionError),
}

pub struct StageExecutor {
    router: Arc<MessageRouter>,
    registry: Arc<AgentRegistry>,
    store: Arc<ExecutionStore>,
    event_bus: EventBus,
    config: ExecutorConfig,
    executor_id: AgentId,
}

impl StageExecutor {
    pub fn new(
        router: Arc<MessageRouter>,
        registry: Arc<AgentRegistry>,
        store: Arc<ExecutionStore>,
        event_bus: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        let executor_id = AgentId::new(config.executor_id.clone());
        Self {
            router,
            registry,
            store,
            event_bus,
            config,
            executor_id,
        }
    }

    pub fn get_execution(&self, id: ExecutionId) -> Option<Execution> {
        self.store.get(id)
    }

    pub async fn execute(&self, task: Value, context: Value) -> Result<PipelineResult, ExecutorError> {
        if self.registry.is_empty() {
            return Err(ExecutorError::NoAgentsConfigured);
        }

        let mut execution = Execution::new(task, context);
        let session_id = SessionId::new();
        self.store.put(execution.clone());
        info!(execution_id = %execution.id, "Pipeline execution started");
        self.event_bus
            .publish_execution_event(ExecutionEvent::ExecutionStarted {
                execution_id: execution.id,
                started_at: execution.created_at,
            });

        // Planning
        self.advance(&mut execution, ExecutionStatus::Planning)?;
        let (planning, plan) = self.run_planning(&execution, session_id).await;
        let planning_error = planning.error.clone();
        execution.stages.planning = Some(planning);
        self.store.put(execution.clone());

        let plan = match plan {
            Some(plan) => {
                self.publish_stage_completed(execution.id, Stage::Planning, true);
                plan
            }
            None => {
                let failure = StageFailure::PlanningFailure {
                    message: planning_error.unwrap_or_default(),
                };
                self.publish_stage_failed(execution.id, Stage::Planning, &failure);
                return self.finish_failed(execution, failure.to_string());
            }
        };

        // Execution
        self.advance(&mut execution, ExecutionStatus::Executing)?;
        let stage = self.run_steps(&mut execution, &plan, session_id).await;
        info!(
            execution_id = %execution.id,
            steps = stage.steps_executed,
            failed = stage.failed_steps(),
            "Execution stage finished"
        );
        let execution_success = stage.success;
        let outputs = stage.outputs.clone();
        execution.stages.execution = Some(stage);
        self.store.put(execution.clone());
        self.publish_stage_completed(execution.id, Stage::Execution, execution_success);

        // Synthesis
        self.advance(&mut execution, ExecutionStatus::Synthesizing)?;
        let (synthesis, failure) = self.run_synthesis(&execution, &plan, outputs, session_id).await;
        let result = synthesis.result.clone();
        execution.stages.synthesis = Some(synthesis);
        self.store.put(execution.clone());
        match failure {
            None => self.publish_stage_completed(execution.id, Stage::Synthesis, true),
            Some(failure) => self.publish_stage_failed(execution.id, Stage::Synthesis, &failure),
        }

        let success = execution.stages.overall_success();
        if success {
            execution.complete()?;
            self.store.put(execution.clone());
            metrics::counter!("aegis_swarm_executions_total", "outcome" => "completed").increment(1);
            info!(execution_id = %execution.id, "Pipeline execution completed");
            self.event_bus
                .publish_execution_event(ExecutionEvent::ExecutionCompleted {
                    execution_id: execution.id,
                    success: true,
                    completed_at: Utc::now(),
                });
        } else {
            execution.fail(NO_STEP_SUCCEEDED)?;
            self.store.put(execution.clone());
            metrics::counter!("aegis_swarm_executions_total", "outcome" => "failed").increment(1);
            warn!(execution_id = %execution.id, "Pipeline execution failed: {}", NO_STEP_SUCCEEDED);
            self.event_bus
                .publish_execution_event(ExecutionEvent::ExecutionFailed {
                    execution_id: execution.id,
                    reason: NO_STEP_SUCCEEDED.to_string(),
                    failed_at: Utc::now(),
                });
        }

        Ok(PipelineResult {
            success,
            execution_id: execution.id,
            result: Some(result),
            stages: execution.stages,
        })
    }

    fn advance(&self, execution: &mut Execution, next: ExecutionStatus) -> Result<(), ExecutionError> {
        execution.transition_to(next)?;
        self.store.put(execution.clone());
        Ok(())
    }

    /// Deliver one stage call, bounding the whole call (retries and backoff
    /// included) by `stage_timeout`. On expiry the attempt in flight is cancelled.
    async fn deliver(
        &self,
        to: &AgentId,
        message: AgentMessage,
        context: Value,
        stage_timeout: Duration,
        session_id: SessionId,
    ) -> Result<Value, CoordinationError> {
        let cancel = self.router.child_token();
        let options = DeliveryOptions::with_timeout(stage_timeout)
            .in_session(session_id)
            .with_cancellation(cancel.clone());

        match tokio::time::timeout(
            stage_timeout,
            self.router
                .send_message_with(&self.executor_id, to, message, context, options),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => {
                cancel.cancel();
                Err(CoordinationError::DeliveryTimeout {
                    agent_id: to.clone(),
                    timeout_ms: stage_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn run_planning(&self, execution: &Execution, session_id: SessionId) -> (PlanningStage, Option<Plan>) {
        let started = Instant::now();
        let failed = |agent_id: Option<AgentId>, error: String| {
            warn!(execution_id = %execution.id, "Planning failed: {}", error);
            PlanningStage {
                success: false,
                agent_id,
                plan: None,
                error: Some(error),
                duration_ms: started.elapsed().as_millis() as u64,
            }
        };

        let planner = match self.router.resolver().resolve(&self.config.planning_capability) {
            Ok(agent) => agent,
            Err(e) => return (failed(None, e.to_string()), None),
        };

        let response = self
            .deliver(
                &planner.id,
                AgentMessage::CreatePlan {
                    task: execution.task.clone(),
                },
                execution.context.clone(),
                self.config.planning_timeout(),
                session_id,
            )
            .await;

        let plan = match response {
            Ok(value) => match serde_json::from_value::<Plan>(value) {
                Ok(plan) => plan,
                Err(e) => return (failed(Some(planner.id), format!("Invalid plan: {}", e)), None),
            },
            Err(e) => return (failed(Some(planner.id), e.to_string()), None),
        };

        info!(
            execution_id = %execution.id,
            planner = %planner.id,
            steps = plan.len(),
            "Plan created"
        );
        let stage = PlanningStage {
            success: true,
            agent_id: Some(planner.id),
            plan: Some(plan.clone()),
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        (stage, Some(plan))
    }

    /// Run the plan's steps in order. Each output is committed to the store
    /// before its step event is published.
    async fn run_steps(&self, execution: &mut Execution, plan: &Plan, session_id: SessionId) -> ExecutionStage {
        let started = Instant::now();
        let mut outputs = Vec::with_capacity(plan.len());

        for step in &plan.steps {
            let response = self
                .deliver(
                    &step.target_agent_id,
                    AgentMessage::ExecuteStep { step: step.clone() },
                    execution.context.clone(),
                    self.config.execution_timeout(),
                    session_id,
                )
                .await;

            let (output, event) = match response {
                Ok(value) => (
                    StepOutput::succeeded(step, value),
                    ExecutionEvent::StepCompleted {
                        execution_id: execution.id,
                        step_id: step.id.clone(),
                        agent_id: step.target_agent_id.clone(),
                        completed_at: Utc::now(),
                    },
                ),
                Err(e) => {
                    let failure = StageFailure::StepFailure {
                        step_id: step.id.clone(),
                        message: e.to_string(),
                    };
                    warn!(execution_id = %execution.id, "{}", failure);
                    (
                        StepOutput::failed(step, e.to_string()),
                        ExecutionEvent::StepFailed {
                            execution_id: execution.id,
                            step_id: step.id.clone(),
                            agent_id: step.target_agent_id.clone(),
                            error: e.to_string(),
                            failed_at: Utc::now(),
                        },
                    )
                }
            };

            outputs.push(output);
            execution.stages.execution = Some(ExecutionStage::from_outputs(
                outputs.clone(),
                started.elapsed().as_millis() as u64,
            ));
            self.store.put(execution.clone());
            self.event_bus.publish_execution_event(event);
        }

        ExecutionStage::from_outputs(outputs, started.elapsed().as_millis() as u64)
    }

    async fn run_synthesis(
        &self,
        execution: &Execution,
        plan: &Plan,
        outputs: Vec<StepOutput>,
        session_id: SessionId,
    ) -> (SynthesisStage, Option<StageFailure>) {
        let started = Instant::now();

        let (agent_id, response) = match self.router.resolver().resolve(&self.config.synthesis_capability) {
            Ok(agent) => {
                let response = self
                    .deliver(
                        &agent.id,
                        AgentMessage::Synthesize {
                            step_outputs: outputs.clone(),
                            plan: plan.clone(),
                        },
                        execution.context.clone(),
                        self.config.synthesis_timeout(),
                        session_id,
                    )
                    .await;
                (Some(agent.id), response)
            }
            Err(e) => (None, Err(e)),
        };

        match response {
            Ok(result) => {
                let stage = SynthesisStage {
                    success: true,
                    agent_id,
                    is_fallback: false,
                    result,
                    error: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                (stage, None)
            }
            Err(e) => {
                let failure = StageFailure::SynthesisFailure { message: e.to_string() };
                warn!(execution_id = %execution.id, "{}; using fallback summary", failure);
                metrics::counter!("aegis_swarm_synthesis_fallbacks_total").increment(1);

                let fallback = FallbackSynthesis::from_outputs(&outputs);
                let summary = fallback.summary.clone();
                let result = serde_json::to_value(fallback).unwrap_or_else(|_| json!({ "summary": summary }));
                let stage = SynthesisStage {
                    success: false,
                    agent_id,
                    is_fallback: true,
                    result,
                    error: Some(e.to_string()),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                (stage, Some(failure))
            }
        }
    }

    fn finish_failed(&self, mut execution: Execution, reason: String) -> Result<PipelineResult, ExecutorError> {
        execution.fail(reason.clone())?;
        self.store.put(execution.clone());
        metrics::counter!("aegis_swarm_executions_total", "outcome" => "failed").increment(1);
        warn!(execution_id = %execution.id, "Pipeline execution failed: {}", reason);
        self.event_bus
            .publish_execution_event(ExecutionEvent::ExecutionFailed {
                execution_id: execution.id,
                reason,
                failed_at: Utc::now(),
            });

        Ok(PipelineResult {
            success: false,
            execution_id: execution.id,
            result: None,
            stages: execution.stages,
        })
    }

    fn publish_stage_completed(&self, execution_id: ExecutionId, stage: Stage, success: bool) {
        self.event_bus
            .publish_execution_event(ExecutionEvent::StageCompleted {
                execution_id,
                stage,
                success,
                completed_at: Utc::now(),
            });
    }

    fn publish_stage_failed(&self, execution_id: ExecutionId, stage: Stage, failure: &StageFailure) {
        self.event_bus
            .publish_execution_event(ExecutionEvent::StageFailed {
                execution_id,
                stage,
                error: failure.to_string(),
                failed_at: Utc::now(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::domain::config::StoreConfig;
    use aegis_core::domain::errors::AgentError;
    use aegis_core::domain::handler::handler_fn;
    use crate::domain::retry::RetryPolicy;

    fn executor() -> (Arc<AgentRegistry>, StageExecutor) {
        let bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            bus.clone(),
            RetryPolicy::none(),
            Duration::from_secs(1),
        ));
        let store = Arc::new(ExecutionStore::new(StoreConfig::default()));
        let executor = StageExecutor::new(router, Arc::clone(&registry), store, bus, ExecutorConfig::default());
        (registry, executor)
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_structural_error() {
        let (_, executor) = executor();
        let err = executor.execute(json!("demo"), Value::Null).await.unwrap_err();
        assert!(matches!(err, ExecutorError::NoAgentsConfigured));
    }

    #[tokio::test]
    async fn test_malformed_plan_fails_planning() {
        let (registry, executor) = executor();
        registry
            .register(
                "planner",
                ["planning"],
                handler_fn(|_envelope, _cancel| async { Ok(json!({"not": "a plan"})) }),
            )
            .unwrap();

        let result = executor.execute(json!("demo"), Value::Null).await.unwrap();

        assert!(!result.success);
        let planning = result.stages.planning.unwrap();
        assert!(!planning.success);
        assert_eq!(planning.agent_id, Some(AgentId::from("planner")));
        assert!(planning.error.unwrap().starts_with("Invalid plan"));
        assert!(result.stages.execution.is_none());
    }

    #[tokio::test]
    async fn test_all_steps_failed_marks_execution_failed() {
        let (registry, executor) = executor();
        registry
            .register(
                "planner",
                ["planning"],
                handler_fn(|_envelope, _cancel| async {
                    Ok(json!({"steps": [{"id": "s1", "targetAgentId": "worker"}]}))
                }),
            )
            .unwrap();
        registry
            .register(
                "worker",
                ["work"],
                handler_fn(|_envelope, _cancel| async { Err(AgentError::failed("nope")) }),
            )
            .unwrap();

        let result = executor.execute(json!("demo"), Value::Null).await.unwrap();

        assert!(!result.success);
        let stage = result.stages.execution.as_ref().unwrap();
        assert!(!stage.success);
        assert_eq!(stage.steps_executed, 1);
        assert!(result.stages.synthesis.as_ref().unwrap().is_fallback);

        let stored = executor.get_execution(result.execution_id).unwrap();
        assert_eq!(stored.status(), ExecutionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some(NO_STEP_SUCCEEDED));
    }

    #[tokio::test]
    async fn test_plan_object_without_steps_fails_planning() {
        let (registry, executor) = executor();
        registry
            .register("planner", ["planning"], handler_fn(|_envelope, _cancel| async { Ok(json!({})) }))
            .unwrap();

        let result = executor.execute(json!("demo"), Value::Null).await.unwrap();

        let planning = result.stages.planning.unwrap();
        assert!(!planning.success);
        assert!(planning.error.unwrap().starts_with("Invalid plan"));
        assert!(result.stages.synthesis.is_none());
    }

    #[tokio::test]
    async fn test_step_outputs_are_stored_before_the_next_step_runs() {
        let (registry, executor) = executor();
        let store = Arc::clone(&executor.store);
        registry
            .register(
                "planner",
                ["planning"],
                handler_fn(|_envelope, _cancel| async {
                    Ok(json!({"steps": [
                        {"id": "s1", "targetAgentId": "worker"},
                        {"id": "s2", "targetAgentId": "worker"}
                    ]}))
                }),
            )
            .unwrap();
        registry
            .register(
                "worker",
                ["work"],
                handler_fn(move |_envelope, _cancel| {
                    let store = Arc::clone(&store);
                    async move {
                        let Some(execution) = store.list_recent(1).pop() else {
                            return Err(AgentError::failed("execution not stored"));
                        };
                        let recorded = execution.stages.execution.as_ref().map(|stage| stage.steps_executed);
                        Ok(json!({"status": execution.status(), "recorded": recorded}))
                    }
                }),
            )
            .unwrap();

        let mut events = executor.event_bus.subscribe();
        let result = executor.execute(json!("demo"), Value::Null).await.unwrap();

        let outputs = &result.stages.execution.as_ref().unwrap().outputs;
        assert_eq!(outputs[0].output, Some(json!({"status": "EXECUTING", "recorded": null})));
        assert_eq!(outputs[1].output, Some(json!({"status": "EXECUTING", "recorded": 1})));

        let mut step_events = 0;
        while let Ok(event) = events.try_recv() {
            if let aegis_core::infrastructure::event_bus::DomainEvent::Execution(
                ExecutionEvent::StepCompleted { .. },
            ) = event
            {
                step_events += 1;
            }
        }
        assert_eq!(step_events, 2);
    }
}
