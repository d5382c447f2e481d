// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Collaborator Contract
//!
//! Anything registered as an agent implements [`AgentHandler`]: it receives
//! one [`Envelope`] per delivery attempt plus a [`CancellationToken`] that the
//! router cancels when the attempt's deadline passes. Handlers that poll the
//! token stop their work on timeout; handlers that ignore it keep running in
//! the background after the caller has given up.
//!
//! Pipeline participants usually implement the typed [`PipelineAgent`] trait
//! instead and register through [`PipelineAgentHandler`].

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::envelope::{AgentMessage, Envelope};
use crate::domain::errors::AgentError;
use crate::domain::pipeline::{Plan, Step, StepOutput};

#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope, cancel: CancellationToken) -> Result<Value, AgentError>;
}

/// Typed pipeline contract: planning, step execution and synthesis.
///
/// Every method has a default that rejects with [`AgentError::Unsupported`],
/// so an agent only implements the roles it plays.
#[async_trait]
pub trait PipelineAgent: Send + Sync {
    async fn create_plan(
        &self,
        _task: &Value,
        _context: &Value,
        _cancel: CancellationToken,
    ) -> Result<Plan, AgentError> {
        Err(AgentError::Unsupported("create_plan".to_string()))
    }

    async fn execute_step(
        &self,
        _step: &Step,
        _context: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value, AgentError> {
        Err(AgentError::Unsupported("execute_step".to_string()))
    }

    async fn synthesize(
        &self,
        _step_outputs: &[StepOutput],
        _plan: &Plan,
        _context: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value, AgentError> {
        Err(AgentError::Unsupported("synthesize".to_string()))
    }

    async fn handle_capability(
        &self,
        capability: &str,
        _params: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value, AgentError> {
        Err(AgentError::Unsupported(format!("capability_request:{}", capability)))
    }
}

/// Adapts a [`PipelineAgent`] to the envelope-level [`AgentHandler`].
pub struct PipelineAgentHandler<A> {
    agent: A,
}

impl<A: PipelineAgent> PipelineAgentHandler<A> {
    pub fn new(agent: A) -> Self {
        Self { agent }
    }

    pub fn shared(agent: A) -> Arc<dyn AgentHandler>
    where
        A: 'static,
    {
        Arc::new(Self::new(agent))
    }
}

#[async_trait]
impl<A: PipelineAgent> AgentHandler for PipelineAgentHandler<A> {
    async fn handle(&self, envelope: &Envelope, cancel: CancellationToken) -> Result<Value, AgentError> {
        match &envelope.payload {
            AgentMessage::CreatePlan { task } => {
                let plan = self.agent.create_plan(task, &envelope.context, cancel).await?;
                serde_json::to_value(plan).map_err(|e| AgentError::Failed(e.to_string()))
            }
            AgentMessage::ExecuteStep { step } => {
                self.agent.execute_step(step, &envelope.context, cancel).await
            }
            AgentMessage::Synthesize { step_outputs, plan } => {
                self.agent
                    .synthesize(step_outputs, plan, &envelope.context, cancel)
                    .await
            }
            AgentMessage::CapabilityRequest { capability, params } => {
                self.agent.handle_capability(capability, params, cancel).await
            }
            AgentMessage::Custom { .. } => Err(AgentError::Unsupported("custom".to_string())),
        }
    }
}

/// Closure-backed handler, handy for lightweight agents and tests.
pub struct FnAgentHandler<F> {
    f: F,
}

impl<F, Fut> FnAgentHandler<F>
where
    F: Fn(Envelope, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, AgentError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

/// Wrap a closure into a shareable [`AgentHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn AgentHandler>
where
    F: Fn(Envelope, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AgentError>> + Send + 'static,
{
    Arc::new(FnAgentHandler::new(f))
}

#[async_trait]
impl<F, Fut> AgentHandler for FnAgentHandler<F>
where
    F: Fn(Envelope, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AgentError>> + Send + 'static,
{
    async fn handle(&self, envelope: &Envelope, cancel: CancellationToken) -> Result<Value, AgentError> {
        (self.f)(envelope.clone(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use crate::domain::envelope::SessionId;
    use serde_json::json;

    struct Planner;

    #[async_trait]
    impl PipelineAgent for Planner {
        async fn create_plan(
            &self,
            task: &Value,
            _context: &Value,
            _cancel: CancellationToken,
        ) -> Result<Plan, AgentError> {
            Ok(Plan::new(vec![Step::new("s1", "worker", task.clone())]))
        }
    }

    fn envelope(payload: AgentMessage) -> Envelope {
        Envelope::new(
            SessionId::new(),
            AgentId::from("stage-executor"),
            AgentId::from("planner"),
            payload,
            Value::Null,
        )
    }

    #[tokio::test]
    async fn test_adapter_serializes_plan() {
        let handler = PipelineAgentHandler::new(Planner);
        let value = handler
            .handle(
                &envelope(AgentMessage::CreatePlan { task: json!("demo") }),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(value["steps"][0]["targetAgentId"], "worker");
        assert_eq!(value["steps"][0]["payload"], "demo");
    }

    #[tokio::test]
    async fn test_adapter_rejects_unimplemented_roles() {
        let handler = PipelineAgentHandler::new(Planner);
        let err = handler
            .handle(
                &envelope(AgentMessage::ExecuteStep {
                    step: Step::new("s1", "worker", Value::Null),
                }),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::Unsupported("execute_step".to_string()));
    }

    #[tokio::test]
    async fn test_fn_handler_echoes_payload() {
        let handler = handler_fn(|envelope: Envelope, _cancel| async move {
            Ok(json!({"from": envelope.from.as_str()}))
        });
        let value = handler
            .handle(&envelope(AgentMessage::Custom { payload: Value::Null }), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(value["from"], "stage-executor");
    }
}
