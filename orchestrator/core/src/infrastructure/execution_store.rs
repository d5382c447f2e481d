// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Store - bounded, TTL-evicting record of pipeline executions
//!
//! Executions are written by the stage executor at every status change and
//! can be inspected until a sweep evicts them. A sweep runs two passes:
//!
//! 1. evict every record older than `execution_ttl`;
//! 2. if the store still holds more than `max_executions`, evict the oldest
//!    records (by creation timestamp) until the cap is met.
//!
//! The periodic sweeper is a cancellable background task. Its owner must call
//! [`ExecutionStore::shutdown`] before process exit.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements internal responsibilities for execution store

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::config::StoreConfig;
use crate::domain::execution::{Execution, ExecutionId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Execution store sweeper already started")]
    AlreadyStarted,

    #[error("Execution store already shut down")]
    AlreadyShutdown,
}

/// Outcome of one sweep cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records evicted because they outlived the TTL
    pub expired: usize,
    /// Records evicted to bring the store back under capacity
    pub evicted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.evicted
    }
}

pub struct ExecutionStore {
    executions: DashMap<ExecutionId, Execution>,
    config: StoreConfig,
    shutdown_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    started: Mutex<bool>,
}

impl ExecutionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            executions: DashMap::new(),
            config,
            shutdown_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
            started: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Insert or replace an execution record
    pub fn put(&self, execution: Execution) {
        self.executions.insert(execution.id, execution);
        metrics::gauge!("aegis_swarm_executions_stored").set(self.executions.len() as f64);
    }

    pub fn get(&self, id: ExecutionId) -> Option<Execution> {
        self.executions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Most recently created executions first
    pub fn list_recent(&self, limit: usize) -> Vec<Execution> {
        let mut executions: Vec<Execution> = self
            .executions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions.truncate(limit);
        executions
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Run both eviction passes as of `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let ttl = chrono::Duration::milliseconds(
            i64::try_from(self.config.execution_ttl_ms).unwrap_or(i64::MAX),
        );

        let before = self.executions.len();
        self.executions.retain(|_, execution| execution.age(now) <= ttl);
        let expired = before - self.executions.len();

        let mut evicted = 0;
        let excess = self.executions.len().saturating_sub(self.config.max_executions);
        if excess > 0 {
            let mut by_age: Vec<(DateTime<Utc>, ExecutionId)> = self
                .executions
                .iter()
                .map(|entry| (entry.value().created_at, *entry.key()))
                .collect();
            by_age.sort();

            for (_, id) in by_age.into_iter().take(excess) {
                if self.executions.remove(&id).is_some() {
                    evicted += 1;
                }
            }
        }

        if expired > 0 {
            metrics::counter!("aegis_swarm_executions_evicted_total", "reason" => "ttl")
                .increment(expired as u64);
        }
        if evicted > 0 {
            metrics::counter!("aegis_swarm_executions_evicted_total", "reason" => "capacity")
                .increment(evicted as u64);
        }
        metrics::gauge!("aegis_swarm_executions_stored").set(self.executions.len() as f64);

        SweepReport { expired, evicted }
    }

    /// Start the periodic sweeper. The first sweep runs one interval from now.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<(), StoreError> {
        if self.shutdown_token.is_cancelled() {
            return Err(StoreError::AlreadyShutdown);
        }

        let mut started = self.started.lock();
        if *started {
            return Err(StoreError::AlreadyStarted);
        }
        *started = true;

        let store = Arc::clone(self);
        let handle = tokio::spawn(async move { store.run_sweeper().await });
        *self.sweeper.lock() = Some(handle);
        Ok(())
    }

    async fn run_sweeper(&self) {
        let period = self.config.sweep_interval();
        info!(
            interval_ms = self.config.sweep_interval_ms,
            ttl_ms = self.config.execution_ttl_ms,
            max_executions = self.config.max_executions,
            "Starting execution store sweeper"
        );

        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let report = self.sweep();
                    if report.total() > 0 {
                        info!(
                            expired = report.expired,
                            evicted = report.evicted,
                            remaining = self.len(),
                            "Execution store sweep completed"
                        );
                    } else {
                        debug!(remaining = self.len(), "Execution store sweep found nothing to evict");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping execution store sweeper");
                    break;
                }
            }
        }
    }

    /// Stop the sweeper and wait for it to exit. Callable once.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        if self.shutdown_token.is_cancelled() {
            return Err(StoreError::AlreadyShutdown);
        }
        self.shutdown_token.cancel();

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            // The task only exits by observing the token, so a join error
            // means it panicked or was aborted; there is nothing left to stop.
            if let Err(e) = handle.await {
                tracing::warn!("Execution store sweeper ended abnormally: {}", e);
            }
        }
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}
