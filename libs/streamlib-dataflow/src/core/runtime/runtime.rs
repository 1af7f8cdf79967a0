// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! StreamRuntime - wires clock, broadcaster, and handlers together.
//!
//! ```text
//! Coordinator thread (tokio current_thread)      Isolated workers (OS threads)
//!   Clock::next_tick()                              for tick in rx
//!     └─ TickBroadcaster::broadcast(tick) ───────────►  process(tick)
//!          └─ cooperative tasks  ─► process(tick)
//! ```
//!
//! The runtime owns the clock, the handler table, and the connection graph.
//! Handlers and connections are added while idle; `start()` runs every
//! `on_start`, then hands the clock to the coordinator. `stop()` closes the
//! tick channels, waits a bounded grace period, runs `on_stop` in reverse
//! registration order, and unregisters every handler.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use super::connections::Connection;
use super::graph::HandlerGraph;
use super::workers::{ActiveWorkers, Worker, panic_message};
use crate::core::clocks::{Clock, SoftwareClock};
use crate::core::config::RuntimeConfig;
use crate::core::context::{BufferPool, HandlerContext};
use crate::core::error::{Result, StreamError};
use crate::core::events::TickHistory;
use crate::core::handler::{BoxedHandler, HandlerId, HandlerRecord, StreamHandler, snake_case};
use crate::core::port_allocator::PortAllocator;
use crate::core::ports::{HandlerPorts, PortAddress};
use crate::core::registry::{ActorRegistry, ActorUri, global_registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    /// Accepting handlers and connections.
    Idle,
    Running,
    /// Torn down. A stopped runtime cannot be restarted.
    Stopped,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeState::Idle => write!(f, "idle"),
            RuntimeState::Running => write!(f, "running"),
            RuntimeState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Returned by `add_handler`; builds port addresses for `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerHandle {
    id: HandlerId,
}

impl HandlerHandle {
    pub fn id(&self) -> &HandlerId {
        &self.id
    }

    pub fn output(&self, port: &str) -> PortAddress {
        PortAddress::new(self.id.clone(), port)
    }

    pub fn input(&self, port: &str) -> PortAddress {
        PortAddress::new(self.id.clone(), port)
    }
}

pub(crate) struct HandlerEntry {
    pub(crate) record: Arc<HandlerRecord>,
    pub(crate) handler: Arc<Mutex<BoxedHandler>>,
    pub(crate) ports: Arc<HandlerPorts>,
    pub(crate) uri: Option<ActorUri>,
}

impl HandlerEntry {
    pub(crate) fn call_on_start(&self, fps: f64) -> Result<()> {
        let ctx = HandlerContext::new(self.record.id().clone(), fps, Arc::clone(&self.ports));
        let mut handler = self.handler.lock();
        panic::catch_unwind(AssertUnwindSafe(|| handler.on_start(&ctx))).unwrap_or_else(|payload| {
            Err(StreamError::Runtime(format!(
                "on_start() panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
    }

    /// Run `on_stop`, waiting at most `wait` for an in-flight `process`.
    pub(crate) fn call_on_stop(&self, wait: Duration) {
        let id = self.record.id();
        let Some(mut handler) = self.handler.try_lock_for(wait) else {
            tracing::warn!("[{}] Still inside process(), skipping on_stop()", id);
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.on_stop())) {
            Ok(Ok(())) => tracing::debug!("[{}] on_stop() complete", id),
            Ok(Err(e)) => tracing::error!("[{}] on_stop() failed: {}", id, e),
            Err(payload) => tracing::error!(
                "[{}] on_stop() panicked: {}",
                id,
                panic_message(payload.as_ref())
            ),
        }
    }

    pub(crate) fn worker(&self, pool: &Arc<BufferPool>, history: &Arc<TickHistory>) -> Worker {
        Worker {
            record: Arc::clone(&self.record),
            handler: Arc::clone(&self.handler),
            ports: Arc::clone(&self.ports),
            pool: Arc::clone(pool),
            history: Arc::clone(history),
        }
    }
}

pub struct StreamRuntime<C: Clock = SoftwareClock> {
    pub(crate) config: RuntimeConfig,
    /// Moved to the coordinator on start.
    pub(crate) clock: Option<C>,
    pub(crate) fps: f64,
    pub(crate) handlers: Vec<HandlerEntry>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) graph: HandlerGraph,
    pub(crate) next_connection_id: usize,
    pub(crate) registry: Option<Arc<ActorRegistry>>,
    pub(crate) port_allocator: Option<Arc<PortAllocator>>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) history: Arc<TickHistory>,
    pub(crate) state: RuntimeState,
    pub(crate) workers: Option<ActiveWorkers>,
}

impl StreamRuntime<SoftwareClock> {
    /// Runtime with a software clock and default configuration.
    pub fn new(fps: f64) -> Result<Self> {
        Self::with_config(RuntimeConfig::with_fps(fps))
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let clock = SoftwareClock::new(config.fps)?;
        StreamRuntime::with_clock(clock, config)
    }
}

impl<C: Clock> StreamRuntime<C> {
    /// Runtime driven by a custom clock. The clock's rate overrides `config.fps`.
    pub fn with_clock(clock: C, mut config: RuntimeConfig) -> Result<Self> {
        config.fps = clock.fps();
        config.validate()?;

        let port_allocator = config
            .port_range
            .map(|range| PortAllocator::new(range.start, range.end))
            .transpose()?
            .map(Arc::new);
        let registry = config.auto_register.then(global_registry);

        Ok(Self {
            fps: config.fps,
            pool: Arc::new(BufferPool::new(config.pool_max_retained)),
            clock: Some(clock),
            handlers: Vec::new(),
            connections: Vec::new(),
            graph: HandlerGraph::new(),
            next_connection_id: 0,
            registry,
            port_allocator,
            history: Arc::new(TickHistory::new()),
            state: RuntimeState::Idle,
            workers: None,
            config,
        })
    }

    /// Register handlers in `registry` instead of the global one.
    ///
    /// Only affects handlers added afterwards.
    pub fn with_registry(mut self, registry: Arc<ActorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running
    }

    pub fn registry(&self) -> Option<&Arc<ActorRegistry>> {
        self.registry.as_ref()
    }

    /// Allocator for the configured `port_range`, if any.
    pub fn port_allocator(&self) -> Option<&Arc<PortAllocator>> {
        self.port_allocator.as_ref()
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub(crate) fn ensure_idle(&self, action: &str) -> Result<()> {
        match self.state {
            RuntimeState::Idle => Ok(()),
            RuntimeState::Running => Err(StreamError::Runtime(format!(
                "Cannot {} while the runtime is running",
                action
            ))),
            RuntimeState::Stopped => Err(StreamError::Runtime(format!(
                "Cannot {} after the runtime has stopped",
                action
            ))),
        }
    }

    /// Add a handler with an id derived from its class name
    /// (`CameraSource` -> `camera_source_0`).
    pub fn add_handler<H: StreamHandler>(&mut self, handler: H) -> Result<HandlerHandle> {
        self.add_boxed_handler(None, Box::new(handler))
    }

    pub fn add_handler_with_id<H: StreamHandler>(
        &mut self,
        id: &str,
        handler: H,
    ) -> Result<HandlerHandle> {
        self.add_boxed_handler(Some(id), Box::new(handler))
    }

    pub fn add_boxed_handler(
        &mut self,
        id: Option<&str>,
        handler: BoxedHandler,
    ) -> Result<HandlerHandle> {
        self.ensure_idle("add a handler")?;
        let id = match id {
            Some(id) => HandlerId::new(id)?,
            None => self.next_handler_id(handler.class_name())?,
        };
        self.insert_handler(id, handler, false)
    }

    pub(crate) fn insert_handler(
        &mut self,
        id: HandlerId,
        handler: BoxedHandler,
        adapter: bool,
    ) -> Result<HandlerHandle> {
        if self.entry(&id).is_some() {
            return Err(StreamError::DuplicateHandler(id.to_string()));
        }

        let class_name = handler.class_name();
        let dispatcher = handler.dispatcher();
        let ports = HandlerPorts::from_specs(
            &id,
            handler.ports(),
            self.config.ordered_write_timeout(),
        )?;
        let record = Arc::new(HandlerRecord::new(
            id.clone(),
            class_name,
            dispatcher,
            adapter,
        ));

        // Adapters are internal plumbing and never named in the registry.
        let uri = match &self.registry {
            Some(registry) if !adapter => Some(registry.register(&record)?),
            _ => None,
        };

        self.graph.add_handler(&id);
        self.handlers.push(HandlerEntry {
            record,
            handler: Arc::new(Mutex::new(handler)),
            ports: Arc::new(ports),
            uri,
        });

        tracing::info!(
            "[Runtime] Added {} {} ({}, {})",
            if adapter { "adapter" } else { "handler" },
            id,
            class_name,
            dispatcher
        );
        Ok(HandlerHandle { id })
    }

    pub(crate) fn next_handler_id(&self, class_name: &str) -> Result<HandlerId> {
        let mut base = snake_case(class_name);
        if base.is_empty() {
            base = String::from("handler");
        }

        let mut n = 0;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self
                .handlers
                .iter()
                .any(|entry| entry.record.id().as_str() == candidate)
            {
                return HandlerId::new(candidate);
            }
            n += 1;
        }
    }

    pub(crate) fn entry(&self, id: &HandlerId) -> Option<&HandlerEntry> {
        self.handlers.iter().find(|entry| entry.record.id() == id)
    }

    pub(crate) fn entry_mut(&mut self, id: &HandlerId) -> Option<&mut HandlerEntry> {
        self.handlers.iter_mut().find(|entry| entry.record.id() == id)
    }

    pub fn handler(&self, id: &str) -> Option<&Arc<HandlerRecord>> {
        self.handlers
            .iter()
            .find(|entry| entry.record.id().as_str() == id)
            .map(|entry| &entry.record)
    }

    /// Handler ids in registration order, adapters included.
    pub fn handler_ids(&self) -> Vec<HandlerId> {
        self.handlers
            .iter()
            .map(|entry| entry.record.id().clone())
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// URI the handler is registered under, while registered.
    pub fn handler_uri(&self, id: &HandlerId) -> Option<&ActorUri> {
        self.entry(id).and_then(|entry| entry.uri.as_ref())
    }

    pub fn ports(&self, id: &HandlerId) -> Option<&HandlerPorts> {
        self.entry(id).map(|entry| entry.ports.as_ref())
    }

    /// Address of the handler's first declared output.
    pub fn default_output(&self, id: &HandlerId) -> Option<PortAddress> {
        let port = self.entry(id)?.ports.default_output()?;
        Some(PortAddress::new(id.clone(), port.name()))
    }

    /// Address of the handler's first declared input.
    pub fn default_input(&self, id: &HandlerId) -> Option<PortAddress> {
        let port = self.entry(id)?.ports.default_input()?;
        Some(PortAddress::new(id.clone(), port.name()))
    }
}

impl<C: Clock> Drop for StreamRuntime<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("[Runtime] Error while stopping on drop: {}", e);
        }
    }
}
