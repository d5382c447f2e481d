// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm domain value objects.

pub mod retry;

pub use retry::RetryPolicy;
