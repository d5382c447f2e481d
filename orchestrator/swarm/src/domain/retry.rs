// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Delivery Retry Policy
//!
//! Linear backoff: the delay before retry `n` (1-based) is `backoff_base * n`.
//! A delivery makes at most `max_retries + 1` attempts in total.

use aegis_core::domain::config::RouterConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// No retries, no delay.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(retry)
    }

    /// Sum of the delays of the first `retries` retries
    pub fn total_delay(&self, retries: u32) -> Duration {
        (1..=retries).map(|n| self.delay_for(n)).sum()
    }
}

impl From<&RouterConfig> for RetryPolicy {
    fn from(config: &RouterConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}
