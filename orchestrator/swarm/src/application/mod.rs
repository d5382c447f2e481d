// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Coordination services built on the core domain types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Registry, resolution, routing and pipeline execution

pub mod coordinator;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod stage_executor;

pub use coordinator::{CoordinatorError, SwarmCoordinator};
pub use registry::AgentRegistry;
pub use resolver::CapabilityResolver;
pub use router::{BroadcastResult, DeliveryOptions, MessageRouter};
pub use stage_executor::{ExecutorError, StageExecutor};
