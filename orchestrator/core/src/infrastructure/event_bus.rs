// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Swarm Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Publishers call into the bus only after the state change an event
// describes has been committed. Delivery is best-effort: a subscriber that
// falls behind by more than the channel capacity loses the oldest events.

use crate::domain::events::{AgentLifecycleEvent, ExecutionEvent, MessageEvent};
use crate::domain::execution::ExecutionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AgentLifecycle(AgentLifecycleEvent),
    Message(MessageEvent),
    Execution(ExecutionEvent),
}

/// Event bus for publishing and subscribing to swarm events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_agent_event(&self, event: AgentLifecycleEvent) {
        self.publish(DomainEvent::AgentLifecycle(event));
    }

    pub fn publish_message_event(&self, event: MessageEvent) {
        self.publish(DomainEvent::Message(event));
    }

    pub fn publish_execution_event(&self, event: ExecutionEvent) {
        self.publish(DomainEvent::Execution(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only errors when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the execution events of a single pipeline execution
    pub fn subscribe_execution(&self, execution_id: ExecutionId) -> ExecutionEventReceiver {
        ExecutionEventReceiver {
            receiver: self.sender.subscribe(),
            execution_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for execution-specific events (filtered)
pub struct ExecutionEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    execution_id: ExecutionId,
}

impl ExecutionEventReceiver {
    /// Receive the next execution event for the subscribed execution ID
    pub async fn recv(&mut self) -> Result<ExecutionEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;

            if let DomainEvent::Execution(exec_event) = event {
                if exec_event.execution_id() == self.execution_id {
                    return Ok(exec_event);
                }
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_agent_event(AgentLifecycleEvent::AgentRegistered {
            agent_id: AgentId::from("planner"),
            capabilities: vec!["planning".to_string()],
            registered_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        match received {
            DomainEvent::AgentLifecycle(AgentLifecycleEvent::AgentRegistered { agent_id, .. }) => {
                assert_eq!(agent_id, AgentId::from("planner"));
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_execution_event_filtering() {
        let event_bus = EventBus::new(10);
        let execution_id = ExecutionId::new();
        let other_execution_id = ExecutionId::new();

        let mut receiver = event_bus.subscribe_execution(execution_id);

        // Different execution, must be skipped
        event_bus.publish_execution_event(ExecutionEvent::ExecutionStarted {
            execution_id: other_execution_id,
            started_at: Utc::now(),
        });
        event_bus.publish_execution_event(ExecutionEvent::ExecutionStarted {
            execution_id,
            started_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.execution_id(), execution_id);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_agent_event(AgentLifecycleEvent::AgentUnregistered {
            agent_id: AgentId::from("worker"),
            unregistered_at: Utc::now(),
        });

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let event_bus = EventBus::default();
        event_bus.publish_agent_event(AgentLifecycleEvent::AgentUnregistered {
            agent_id: AgentId::from("ghost"),
            unregistered_at: Utc::now(),
        });

        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_lagging_receiver_reports_drops() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for _ in 0..5 {
            event_bus.publish_execution_event(ExecutionEvent::ExecutionStarted {
                execution_id: ExecutionId::new(),
                started_at: Utc::now(),
            });
        }

        assert!(matches!(receiver.recv().await, Err(EventBusError::Lagged(3))));
    }
}
