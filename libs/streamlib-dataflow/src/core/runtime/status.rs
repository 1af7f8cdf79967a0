// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::Serialize;

use super::runtime::{RuntimeState, StreamRuntime};
use crate::core::clocks::Clock;
use crate::core::handler::{HandlerStatsSnapshot, LifecycleState};
use crate::core::scheduling::Dispatcher;

#[derive(Debug, Clone, Serialize)]
pub struct HandlerStatus {
    pub id: String,
    pub class_name: String,
    pub dispatcher: Dispatcher,
    pub state: LifecycleState,
    pub adapter: bool,
    /// Present while the handler is registered.
    pub uri: Option<String>,
    pub stats: HandlerStatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub state: RuntimeState,
    pub fps: f64,
    pub handler_count: usize,
    pub connection_count: usize,
    pub adapter_count: usize,
    pub handlers: Vec<HandlerStatus>,
}

impl RuntimeStatus {
    pub fn handler(&self, id: &str) -> Option<&HandlerStatus> {
        self.handlers.iter().find(|status| status.id == id)
    }

    /// Ticks dropped across all handlers because their queues were full.
    pub fn total_ticks_dropped(&self) -> u64 {
        self.handlers.iter().map(|status| status.stats.ticks_dropped).sum()
    }
}

impl<C: Clock> StreamRuntime<C> {
    pub fn status(&self) -> RuntimeStatus {
        let handlers: Vec<HandlerStatus> = self
            .handlers
            .iter()
            .map(|entry| HandlerStatus {
                id: entry.record.id().to_string(),
                class_name: entry.record.class_name().to_string(),
                dispatcher: entry.record.dispatcher(),
                state: entry.record.state(),
                adapter: entry.record.is_adapter(),
                uri: entry.uri.as_ref().map(ToString::to_string),
                stats: entry.record.stats().snapshot(),
            })
            .collect();

        RuntimeStatus {
            state: self.state,
            fps: self.fps,
            handler_count: handlers.len(),
            connection_count: self.connections.len(),
            adapter_count: handlers.iter().filter(|status| status.adapter).count(),
            handlers,
        }
    }
}
