// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Start and stop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::runtime::{RuntimeState, StreamRuntime};
use super::workers::{ActiveWorkers, Worker};
use crate::core::clocks::Clock;
use crate::core::config::StartPolicy;
use crate::core::error::{Result, StreamError};
use crate::core::handler::{HandlerId, LifecycleState};

/// Lower bound on the wait for a handler lock during stop, so a handler
/// that just finished its last tick still gets `on_stop`.
const MIN_STOP_WAIT: Duration = Duration::from_millis(10);

impl<C: Clock> StreamRuntime<C> {
    /// Start every handler and begin ticking.
    ///
    /// `on_start` runs in registration order. What happens when one fails is
    /// governed by [`StartPolicy`]. A runtime can be started once.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            RuntimeState::Idle => {}
            RuntimeState::Running => {
                return Err(StreamError::Runtime("Runtime already running".into()));
            }
            RuntimeState::Stopped => {
                return Err(StreamError::Runtime(
                    "Runtime has been stopped and cannot be restarted".into(),
                ));
            }
        }

        tracing::info!(
            "[Runtime] Starting {} handler(s), {} connection(s) at {} fps",
            self.handlers.len(),
            self.connections.len(),
            self.fps
        );

        if self.graph.has_cycle() {
            tracing::warn!("[Runtime] Connection graph contains a feedback loop");
        }

        let started = self.start_handlers()?;
        let workers: Vec<Worker> = started
            .iter()
            .map(|&index| self.handlers[index].worker(&self.pool, &self.history))
            .collect();

        let spawned = match self.clock.take() {
            Some(clock) => ActiveWorkers::spawn(clock, workers, &self.config, Arc::clone(&self.history)),
            None => Err(StreamError::Runtime("Clock already consumed".into())),
        };

        match spawned {
            Ok(active) => {
                self.workers = Some(active);
                self.state = RuntimeState::Running;
                tracing::info!("[Runtime] Running ({} active handler(s))", started.len());
                Ok(())
            }
            Err(e) => {
                tracing::error!("[Runtime] Failed to spawn workers: {}", e);
                self.stop_started(&started, Instant::now() + self.config.stop_grace());
                self.finish_stop();
                Err(e)
            }
        }
    }

    /// Run `on_start` in registration order. Returns the indices of handlers
    /// that should receive ticks.
    fn start_handlers(&mut self) -> Result<Vec<usize>> {
        let mut started: Vec<usize> = Vec::new();
        let mut disabled: BTreeSet<HandlerId> = BTreeSet::new();
        let grace = self.config.stop_grace();

        for index in 0..self.handlers.len() {
            let id = self.handlers[index].record.id().clone();
            if disabled.contains(&id) {
                continue;
            }

            let error = match self.handlers[index].call_on_start(self.fps) {
                Ok(()) => {
                    self.handlers[index].record.set_state(LifecycleState::Started);
                    tracing::debug!("[{}] on_start() complete", id);
                    started.push(index);
                    continue;
                }
                Err(e) => e,
            };

            tracing::error!("[{}] on_start() failed: {}", id, error);
            self.handlers[index].record.set_state(LifecycleState::Failed);
            self.handlers[index].call_on_stop(grace);

            match self.config.start_policy {
                StartPolicy::Rollback => {
                    tracing::warn!(
                        "[Runtime] Rolling back {} started handler(s)",
                        started.len()
                    );
                    self.stop_started(&started, Instant::now() + grace);
                    self.finish_stop();
                    return Err(StreamError::StartFailed {
                        handler: id.to_string(),
                        source: Box::new(error),
                    });
                }
                StartPolicy::Isolate => {
                    self.close_inputs(index);
                    let downstream = self.downstream_of(&id);
                    for handler in &downstream {
                        let Some(position) = self.handlers.iter().position(|e| e.record.id() == handler)
                        else {
                            continue;
                        };
                        if let Some(slot) = started.iter().position(|&i| i == position) {
                            started.remove(slot);
                            self.handlers[position].call_on_stop(grace);
                        }
                        self.handlers[position].record.set_state(LifecycleState::Failed);
                        self.close_inputs(position);
                    }
                    tracing::warn!(
                        "[Runtime] Disabled {} and {} downstream handler(s)",
                        id,
                        downstream.len()
                    );
                    disabled.extend(downstream);
                }
            }
        }

        Ok(started)
    }

    /// Close every cell feeding the handler at `index`, so live producers
    /// upstream of a disabled handler never wait on it.
    fn close_inputs(&self, index: usize) {
        let entry = &self.handlers[index];
        for input in entry.ports.inputs() {
            if let Some(cell) = input.cell() {
                cell.close();
                tracing::debug!("[{}] Closed {}", entry.record.id(), cell.label());
            }
        }
    }

    /// Stop ticking and tear everything down.
    ///
    /// In-flight `process` calls get until the configured grace period to
    /// return; handlers still busy after that are abandoned. `on_stop` then
    /// runs in reverse registration order and every handler is unregistered.
    /// Stopping a stopped runtime is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            RuntimeState::Stopped => return Ok(()),
            RuntimeState::Idle => {
                self.finish_stop();
                return Ok(());
            }
            RuntimeState::Running => {}
        }

        tracing::info!("[Runtime] Stopping...");
        let deadline = Instant::now() + self.config.stop_grace();

        let active: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.record.state().is_active())
            .map(|(index, _)| index)
            .collect();
        for &index in &active {
            self.handlers[index].record.set_state(LifecycleState::Stopping);
        }

        if let Some(workers) = self.workers.take() {
            workers.shutdown(deadline);
        }

        self.stop_started(&active, deadline);
        self.finish_stop();
        tracing::info!("[Runtime] Stopped");
        Ok(())
    }

    /// `on_stop` for `indices` in reverse order.
    fn stop_started(&mut self, indices: &[usize], deadline: Instant) {
        for &index in indices.iter().rev() {
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_STOP_WAIT);
            let entry = &self.handlers[index];
            entry.call_on_stop(wait);
            entry.record.set_state(LifecycleState::Stopped);
        }
    }

    /// Unregister every handler and mark the runtime stopped.
    fn finish_stop(&mut self) {
        for entry in &mut self.handlers {
            if entry.record.state() != LifecycleState::Failed {
                entry.record.set_state(LifecycleState::Stopped);
            }
            if let (Some(uri), Some(registry)) = (entry.uri.take(), &self.registry) {
                if let Err(e) = registry.unregister(&uri) {
                    tracing::warn!("[{}] Failed to unregister {}: {}", entry.record.id(), uri, e);
                }
            }
        }
        self.history.clear();
        self.state = RuntimeState::Stopped;
    }
}
