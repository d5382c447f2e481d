// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides the pure domain types of the coordination layer. No I/O apart
//! from configuration file loading.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod agent;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod execution;
pub mod handler;
pub mod pipeline;
