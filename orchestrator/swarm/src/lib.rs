// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-swarm`: Multi-Agent Coordination Crate
//!
//! In-process coordination of named agents: request/response delivery with
//! retry, backoff and timeout, plus the Plan → Execute → Synthesize pipeline.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `RetryPolicy` |
//! | [`application`] | Application | `AgentRegistry`, `CapabilityResolver`, `MessageRouter`, `StageExecutor`, `SwarmCoordinator` |
//!
//! ## Key Concepts
//!
//! - **Agent**: a named participant with a capability set and a handler.
//!   Inactive agents stay registered but receive no deliveries.
//! - **Envelope**: one logical delivery, carrying its retry counter across attempts.
//! - **Stage isolation**: planning failures are fatal, step failures are
//!   recorded and skipped, synthesis failures fall back to a local summary.
//!
//! Shared state is limited to the registry and the execution store, both
//! owned by a [`SwarmCoordinator`](application::SwarmCoordinator).

pub mod application;
pub mod domain;

pub use application::*;
pub use domain::*;
