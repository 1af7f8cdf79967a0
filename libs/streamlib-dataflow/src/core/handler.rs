// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The handler contract.
//!
//! A handler declares its ports up front, then receives `on_start` once,
//! `process` once per tick it is handed, and `on_stop` once. Sources, sinks
//! and effects are all handlers; the runtime never looks inside payloads.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::context::{HandlerContext, ProcessContext};
use crate::core::error::{Result, StreamError};
use crate::core::ports::PortSpec;
use crate::core::scheduling::Dispatcher;

/// Pluggable processing unit.
pub trait StreamHandler: Send + 'static {
    /// Class name used in actor URIs.
    ///
    /// Defaults to the implementing type's name without module path or
    /// generic arguments.
    fn class_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Port declarations, in declaration order. The first input and first
    /// output are the defaults used by pipeline auto-wiring.
    fn ports(&self) -> Vec<PortSpec>;

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::Cooperative
    }

    /// Called once before the first tick. An error here disables this
    /// handler (and, depending on the start policy, the whole start).
    fn on_start(&mut self, _ctx: &HandlerContext) -> Result<()> {
        Ok(())
    }

    /// Called once per tick. Read at most one message per input and write
    /// at most one per output.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()>;

    /// Release resources. Runs even if `process` failed or was abandoned,
    /// and may run on a handler whose `on_start` never succeeded.
    fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type BoxedHandler = Box<dyn StreamHandler>;

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// `CameraSource` -> `camera_source`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
        }
    }
    out
}

/// Handler identifier, unique within a runtime.
///
/// Restricted to `[A-Za-z0-9_-]+` so it can double as a URI instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StreamError::Configuration(format!(
                "Invalid handler id '{}' (allowed: [A-Za-z0-9_-]+)",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HandlerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    /// `on_start` succeeded, tick subscription in place.
    Started,
    /// Has processed at least one tick.
    Running,
    Stopping,
    Stopped,
    /// `on_start` failed or the handler was disabled with its upstream.
    Failed,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Started | LifecycleState::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-handler counters, updated by the worker that drives the handler.
#[derive(Debug, Default)]
pub struct HandlerStats {
    ticks_processed: AtomicU64,
    process_errors: AtomicU64,
    ticks_dropped: std::sync::Arc<AtomicU64>,
    last_frame: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStatsSnapshot {
    pub ticks_processed: u64,
    pub process_errors: u64,
    /// Ticks skipped because the handler's tick queue was full.
    pub ticks_dropped: u64,
    /// Frame number of the last tick handed to `process`.
    pub last_frame: Option<u64>,
}

impl HandlerStats {
    pub(crate) fn record_tick(&self, frame_number: u64, ok: bool) {
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.process_errors.fetch_add(1, Ordering::Relaxed);
        }
        // Stored +1 so that 0 means "none yet".
        self.last_frame.store(frame_number + 1, Ordering::Relaxed);
    }

    /// Counter the tick broadcaster increments on a full queue.
    pub(crate) fn dropped_counter(&self) -> std::sync::Arc<AtomicU64> {
        std::sync::Arc::clone(&self.ticks_dropped)
    }

    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        let last = self.last_frame.load(Ordering::Relaxed);
        HandlerStatsSnapshot {
            ticks_processed: self.ticks_processed.load(Ordering::Relaxed),
            process_errors: self.process_errors.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            last_frame: last.checked_sub(1),
        }
    }
}

/// Shared, observable side of a handler: what the registry and status
/// reporting see. The handler object itself stays with its worker.
#[derive(Debug)]
pub struct HandlerRecord {
    id: HandlerId,
    class_name: &'static str,
    dispatcher: Dispatcher,
    adapter: bool,
    state: Mutex<LifecycleState>,
    stats: HandlerStats,
}

impl HandlerRecord {
    pub(crate) fn new(
        id: HandlerId,
        class_name: &'static str,
        dispatcher: Dispatcher,
        adapter: bool,
    ) -> Self {
        Self {
            id,
            class_name,
            dispatcher,
            adapter,
            state: Mutex::new(LifecycleState::Created),
            stats: HandlerStats::default(),
        }
    }

    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    /// Whether the runtime inserted this handler to bridge capabilities.
    pub fn is_adapter(&self) -> bool {
        self.adapter
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::trace!("[{}] {} -> {}", self.id, *current, state);
            *current = state;
        }
    }

    /// Move Started to Running on the first processed tick.
    pub(crate) fn mark_running(&self) {
        let mut current = self.state.lock();
        if *current == LifecycleState::Started {
            *current = LifecycleState::Running;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }
}
