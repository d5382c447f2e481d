// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-core`: Swarm Coordination Primitives
//!
//! Domain types and in-process infrastructure shared by the swarm
//! coordination layer (`aegis-swarm`).
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | agents, envelopes, plans, executions, events, config |
//! | [`infrastructure`] | Infrastructure | `EventBus`, `ExecutionStore` |

pub mod domain;
pub mod infrastructure;

pub use domain::*;
