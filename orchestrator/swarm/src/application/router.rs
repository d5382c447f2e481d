// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Router
//!
//! Delivers request/response envelopes between registered agents.
//!
//! Every delivery attempt is bounded by a timeout and receives its own
//! [`CancellationToken`], which is cancelled when the attempt times out so
//! that handlers honouring the token stop their work. Timeouts and handler
//! errors are retried identically with linear backoff (`backoff_base * n`
//! before retry `n`); missing or inactive targets fail without retry.
//!
//! Retries are an explicit bounded loop, so at most `max_retries + 1`
//! attempts are made per envelope.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Point-to-point, broadcast and capability-based delivery

use aegis_core::domain::agent::AgentId;
use aegis_core::domain::envelope::{AgentMessage, Envelope, SessionId};
use aegis_core::domain::errors::CoordinationError;
use aegis_core::domain::events::MessageEvent;
use aegis_core::infrastructure::event_bus::EventBus;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::registry::AgentRegistry;
use crate::application::resolver::CapabilityResolver;
use crate::domain::retry::RetryPolicy;

/// Per-call overrides for [`MessageRouter::send_message_with`].
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    /// Attempt deadline; the router default applies when `None`
    pub timeout: Option<Duration>,
    /// Session to correlate the envelope with; a fresh one when `None`
    pub session_id: Option<SessionId>,
    /// Parent of every attempt token; the router root token when `None`
    pub cancel: Option<CancellationToken>,
}

impl DeliveryOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Derive attempt tokens from `cancel`, so cancelling it stops the
    /// attempt currently in flight.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Per-target entry of a broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    pub agent_id: AgentId,
    pub outcome: Result<Value, CoordinationError>,
}

impl BroadcastResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn response(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CoordinationError> {
        self.outcome.as_ref().err()
    }
}

pub struct MessageRouter {
    registry: Arc<AgentRegistry>,
    resolver: CapabilityResolver,
    event_bus: EventBus,
    retry: RetryPolicy,
    timeout: Duration,
    root_token: CancellationToken,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<AgentRegistry>,
        event_bus: EventBus,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let resolver = CapabilityResolver::new(Arc::clone(&registry));
        Self {
            registry,
            resolver,
            event_bus,
            retry,
            timeout,
            root_token: CancellationToken::new(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn resolver(&self) -> &CapabilityResolver {
        &self.resolver
    }

    /// Token cancelled together with every in-flight attempt on shutdown
    pub fn child_token(&self) -> CancellationToken {
        self.root_token.child_token()
    }

    /// Deliver `message` to `to` with the router's default timeout.
    pub async fn send_message(
        &self,
        from: &AgentId,
        to: &AgentId,
        message: AgentMessage,
        context: Value,
    ) -> Result<Value, CoordinationError> {
        self.send_message_with(from, to, message, context, DeliveryOptions::default())
            .await
    }

    /// Deliver `message` to `to`, retrying timeouts and handler errors.
    ///
    /// Resolves with the handler's response verbatim, or rejects with the
    /// error of the last attempt.
    pub async fn send_message_with(
        &self,
        from: &AgentId,
        to: &AgentId,
        message: AgentMessage,
        context: Value,
        options: DeliveryOptions,
    ) -> Result<Value, CoordinationError> {
        let timeout = options.timeout.unwrap_or(self.timeout);
        let parent = options.cancel.unwrap_or_else(|| self.root_token.clone());
        let mut envelope = Envelope::new(
            options.session_id.unwrap_or_default(),
            from.clone(),
            to.clone(),
            message,
            context,
        );

        debug!(
            envelope_id = %envelope.id.0,
            from = %from,
            to = %to,
            kind = envelope.payload.kind(),
            "Sending message"
        );

        loop {
            match self.attempt(&envelope, timeout, &parent).await {
                Ok(response) => {
                    self.on_delivered(&envelope);
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && envelope.retry_count < self.retry.max_retries => {
                    envelope.retry_count += 1;
                    let delay = self.retry.delay_for(envelope.retry_count);
                    warn!(
                        envelope_id = %envelope.id.0,
                        to = %to,
                        retry = envelope.retry_count,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery attempt failed, retrying"
                    );
                    metrics::counter!("aegis_swarm_delivery_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.on_failed(&envelope, &err);
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        envelope: &Envelope,
        timeout: Duration,
        parent: &CancellationToken,
    ) -> Result<Value, CoordinationError> {
        let (agent, handler) = self
            .registry
            .handler_for(&envelope.to)
            .ok_or_else(|| CoordinationError::TargetNotFound(envelope.to.clone()))?;

        if !agent.active {
            return Err(CoordinationError::TargetInactive(agent.id));
        }

        let cancel = parent.child_token();
        match tokio::time::timeout(timeout, handler.handle(envelope, cancel.clone())).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CoordinationError::HandlerError {
                agent_id: agent.id,
                message: e.to_string(),
            }),
            Err(_) => {
                cancel.cancel();
                Err(CoordinationError::DeliveryTimeout {
                    agent_id: agent.id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn on_delivered(&self, envelope: &Envelope) {
        debug!(
            envelope_id = %envelope.id.0,
            to = %envelope.to,
            attempts = envelope.attempt(),
            "Message delivered"
        );
        metrics::counter!("aegis_swarm_messages_delivered_total").increment(1);
        self.event_bus
            .publish_message_event(MessageEvent::MessageDelivered {
                envelope_id: envelope.id,
                session_id: envelope.session_id,
                from: envelope.from.clone(),
                to: envelope.to.clone(),
                attempts: envelope.attempt(),
                delivered_at: Utc::now(),
            });
    }

    fn on_failed(&self, envelope: &Envelope, err: &CoordinationError) {
        warn!(
            envelope_id = %envelope.id.0,
            to = %envelope.to,
            attempts = envelope.attempt(),
            error = %err,
            "Message delivery failed"
        );
        metrics::counter!("aegis_swarm_messages_failed_total").increment(1);
        self.event_bus
            .publish_message_event(MessageEvent::MessageFailed {
                envelope_id: envelope.id,
                session_id: envelope.session_id,
                from: envelope.from.clone(),
                to: envelope.to.clone(),
                attempts: envelope.attempt(),
                error: err.to_string(),
                failed_at: Utc::now(),
            });
    }

    /// Deliver `message` to every registered agent except `from`.
    ///
    /// Targets are contacted concurrently and fail independently; the call
    /// itself never fails. Inactive agents are included and report
    /// `TargetInactive`.
    pub async fn broadcast(
        &self,
        from: &AgentId,
        message: AgentMessage,
        context: Value,
    ) -> Vec<BroadcastResult> {
        let session_id = SessionId::new();
        let targets: Vec<AgentId> = self
            .registry
            .list()
            .into_iter()
            .map(|agent| agent.id)
            .filter(|id| id != from)
            .collect();

        info!(from = %from, targets = targets.len(), kind = message.kind(), "Broadcasting message");

        let deliveries = targets.into_iter().map(|agent_id| {
            let message = message.clone();
            let context = context.clone();
            async move {
                let outcome = self
                    .send_message_with(
                        from,
                        &agent_id,
                        message,
                        context,
                        DeliveryOptions::default().in_session(session_id),
                    )
                    .await;
                BroadcastResult { agent_id, outcome }
            }
        });

        join_all(deliveries).await
    }

    /// Resolve an agent offering `capability` and deliver a capability request to it.
    pub async fn request_capability(
        &self,
        from: &AgentId,
        capability: &str,
        params: Value,
    ) -> Result<Value, CoordinationError> {
        let target = self.resolver.resolve(capability)?;
        self.send_message(
            from,
            &target.id,
            AgentMessage::CapabilityRequest {
                capability: capability.to_string(),
                params,
            },
            Value::Null,
        )
        .await
    }

    /// Cancel the tokens of every in-flight delivery attempt.
    pub fn cancel_inflight(&self) {
        self.root_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::domain::errors::AgentError;
    use aegis_core::domain::handler::handler_fn;
    use aegis_core::infrastructure::event_bus::DomainEvent;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn router(max_retries: u32, backoff_ms: u64, timeout_ms: u64) -> (Arc<AgentRegistry>, MessageRouter) {
        let bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let router = MessageRouter::new(
            Arc::clone(&registry),
            bus,
            RetryPolicy::new(max_retries, Duration::from_millis(backoff_ms)),
            Duration::from_millis(timeout_ms),
        );
        (registry, router)
    }

    fn custom(payload: Value) -> AgentMessage {
        AgentMessage::Custom { payload }
    }

    #[tokio::test]
    async fn test_delivers_response_verbatim() {
        let (registry, router) = router(3, 10, 1_000);
        registry
            .register(
                "echo",
                ["echo"],
                handler_fn(|envelope: Envelope, _cancel| async move {
                    match envelope.payload {
                        AgentMessage::Custom { payload } => Ok(json!({"echo": payload})),
                        _ => Err(AgentError::InvalidMessage("expected custom".into())),
                    }
                }),
            )
            .unwrap();

        let response = router
            .send_message(&AgentId::from("caller"), &AgentId::from("echo"), custom(json!(42)), Value::Null)
            .await
            .unwrap();

        assert_eq!(response, json!({"echo": 42}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff_until_success() {
        let (registry, router) = router(3, 100, 1_000);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry
            .register(
                "flaky",
                ["work"],
                handler_fn(move |_envelope, _cancel| {
                    let counter = Arc::clone(&counter);
                    async move {
                        // fail twice, then succeed
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(AgentError::failed("not yet"))
                        } else {
                            Ok(json!("done"))
                        }
                    }
                }),
            )
            .unwrap();

        let started = tokio::time::Instant::now();
        let response = router
            .send_message(&AgentId::from("caller"), &AgentId::from("flaky"), custom(Value::Null), Value::Null)
            .await
            .unwrap();

        assert_eq!(response, json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= router.retry_policy().total_delay(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_make_max_retries_plus_one_attempts() {
        let (registry, router) = router(3, 10, 1_000);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry
            .register(
                "broken",
                ["work"],
                handler_fn(move |_envelope, _cancel| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(AgentError::failed("boom")) }
                }),
            )
            .unwrap();

        let err = router
            .send_message(&AgentId::from("caller"), &AgentId::from("broken"), custom(Value::Null), Value::Null)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            err,
            CoordinationError::HandlerError {
                agent_id: AgentId::from("broken"),
                message: "boom".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_attempt_token() {
        let (registry, router) = router(0, 10, 50);
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        registry
            .register(
                "slow",
                ["work"],
                handler_fn(move |_envelope, cancel: CancellationToken| {
                    let flag = Arc::clone(&flag);
                    async move {
                        tokio::spawn(async move {
                            cancel.cancelled().await;
                            flag.store(true, Ordering::SeqCst);
                        });
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Value::Null)
                    }
                }),
            )
            .unwrap();

        let err = router
            .send_message(&AgentId::from("caller"), &AgentId::from("slow"), custom(Value::Null), Value::Null)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CoordinationError::DeliveryTimeout {
                agent_id: AgentId::from("slow"),
                timeout_ms: 50
            }
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_token_parents_attempt_tokens() {
        let (registry, router) = router(0, 10, 60_000);
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        registry
            .register(
                "slow",
                ["work"],
                handler_fn(move |_envelope, cancel: CancellationToken| {
                    let flag = Arc::clone(&flag);
                    async move {
                        cancel.cancelled().await;
                        flag.store(true, Ordering::SeqCst);
                        Err(AgentError::failed("cancelled"))
                    }
                }),
            )
            .unwrap();

        let caller_token = router.child_token();
        let options = DeliveryOptions::with_timeout(Duration::from_secs(60)).with_cancellation(caller_token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            caller_token.cancel();
        });

        let err = router
            .send_message_with(
                &AgentId::from("caller"),
                &AgentId::from("slow"),
                custom(Value::Null),
                Value::Null,
                options,
            )
            .await
            .unwrap_err();

        canceller.await.unwrap();
        assert!(observed.load(Ordering::SeqCst));
        assert!(matches!(err, CoordinationError::HandlerError { .. }));
    }

    #[tokio::test]
    async fn test_missing_and_inactive_targets_fail_fast() {
        let (registry, router) = router(5, 1_000, 1_000);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry
            .register(
                "sleepy",
                ["work"],
                handler_fn(move |_envelope, _cancel| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Value::Null) }
                }),
            )
            .unwrap();
        registry.set_active(&AgentId::from("sleepy"), false).unwrap();

        let caller = AgentId::from("caller");
        let err = router
            .send_message(&caller, &AgentId::from("nobody"), custom(Value::Null), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::TargetNotFound(AgentId::from("nobody")));

        let err = router
            .send_message(&caller, &AgentId::from("sleepy"), custom(Value::Null), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::TargetInactive(AgentId::from("sleepy")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_isolates_failing_target() {
        let (registry, router) = router(2, 10, 1_000);
        for id in ["a", "b", "c"] {
            registry
                .register(id, ["work"], handler_fn(move |_envelope, _cancel| async move { Ok(json!(id)) }))
                .unwrap();
        }
        registry
            .register(
                "d",
                ["work"],
                handler_fn(|_envelope, _cancel| async { Err(AgentError::failed("always")) }),
            )
            .unwrap();
        registry
            .register("sender", ["work"], handler_fn(|_envelope, _cancel| async { Ok(Value::Null) }))
            .unwrap();

        let results = router
            .broadcast(&AgentId::from("sender"), custom(json!("hello")), Value::Null)
            .await;

        assert_eq!(results.len(), 4);
        let failures: Vec<&BroadcastResult> = results.iter().filter(|r| r.is_error()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].agent_id, AgentId::from("d"));
        assert!(results.iter().all(|r| r.agent_id != AgentId::from("sender")));
        let a = results.iter().find(|r| r.agent_id == AgentId::from("a")).unwrap();
        assert_eq!(a.response(), Some(&json!("a")));
    }

    #[tokio::test]
    async fn test_request_capability_routes_to_first_capable_agent() {
        let (registry, router) = router(0, 10, 1_000);
        registry
            .register(
                "translator",
                ["translate"],
                handler_fn(|envelope: Envelope, _cancel| async move {
                    match envelope.payload {
                        AgentMessage::CapabilityRequest { capability, params } => {
                            Ok(json!({"capability": capability, "params": params}))
                        }
                        _ => Err(AgentError::InvalidMessage("expected capability request".into())),
                    }
                }),
            )
            .unwrap();

        let caller = AgentId::from("caller");
        let response = router
            .request_capability(&caller, "translate", json!({"text": "hola"}))
            .await
            .unwrap();
        assert_eq!(response["capability"], "translate");
        assert_eq!(response["params"]["text"], "hola");

        let err = router
            .request_capability(&caller, "summarize", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::NoCapableAgent("summarize".to_string()));
    }

    #[tokio::test]
    async fn test_delivery_events_report_attempts() {
        let bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new(bus.clone()));
        let router = MessageRouter::new(
            Arc::clone(&registry),
            bus.clone(),
            RetryPolicy::none(),
            Duration::from_secs(1),
        );
        registry
            .register("ok", ["work"], handler_fn(|_envelope, _cancel| async { Ok(Value::Null) }))
            .unwrap();

        let mut receiver = bus.subscribe();
        router
            .send_message(&AgentId::from("caller"), &AgentId::from("ok"), custom(Value::Null), Value::Null)
            .await
            .unwrap();
        let _ = router
            .send_message(&AgentId::from("caller"), &AgentId::from("missing"), custom(Value::Null), Value::Null)
            .await;

        match receiver.recv().await.unwrap() {
            DomainEvent::Message(MessageEvent::MessageDelivered { attempts, to, .. }) => {
                assert_eq!(attempts, 1);
                assert_eq!(to, AgentId::from("ok"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            receiver.recv().await.unwrap(),
            DomainEvent::Message(MessageEvent::MessageFailed { .. })
        ));
    }
}
