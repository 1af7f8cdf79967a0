// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linear pipeline builder.
//!
//! ```ignore
//! let mut pipeline = PipelineBuilder::new(30.0)
//!     .source(CameraSource::default())
//!     .effect(Blur::new(3))
//!     .sink(Display::default())
//!     .build()?;
//! pipeline.start()?;
//! ```
//!
//! `effect` and `sink` wire the previous stage's first output to the new
//! stage's first input. The first error is kept and reported by `build`.

use crate::core::clocks::{Clock, SoftwareClock};
use crate::core::config::RuntimeConfig;
use crate::core::error::{Result, StreamError};
use crate::core::handler::{HandlerId, StreamHandler};
use crate::core::runtime::{RuntimeStatus, StreamRuntime};
use crate::core::scheduling::Dispatcher;
use crate::core::topology::Topology;

pub struct PipelineBuilder<C: Clock = SoftwareClock> {
    runtime: Option<StreamRuntime<C>>,
    stages: Vec<(HandlerId, Dispatcher)>,
    previous: Option<HandlerId>,
    error: Option<StreamError>,
}

impl PipelineBuilder<SoftwareClock> {
    pub fn new(fps: f64) -> Self {
        Self::with_config(RuntimeConfig::with_fps(fps))
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        match StreamRuntime::with_config(config) {
            Ok(runtime) => Self::with_runtime(runtime),
            Err(e) => Self {
                runtime: None,
                stages: Vec::new(),
                previous: None,
                error: Some(e),
            },
        }
    }
}

impl<C: Clock> PipelineBuilder<C> {
    /// Build on an existing (idle) runtime.
    pub fn with_runtime(runtime: StreamRuntime<C>) -> Self {
        Self {
            runtime: Some(runtime),
            stages: Vec::new(),
            previous: None,
            error: None,
        }
    }

    /// Add a stage that starts a chain. Nothing is wired into it.
    pub fn source<H: StreamHandler>(mut self, handler: H) -> Self {
        if let Some(id) = self.append(handler) {
            self.previous = Some(id);
        }
        self
    }

    /// Add a stage fed by the previous one.
    pub fn effect<H: StreamHandler>(mut self, handler: H) -> Self {
        if let Some(id) = self.append(handler) {
            self.wire_previous(&id);
            self.previous = Some(id);
        }
        self
    }

    /// Add a terminal stage fed by the previous one.
    pub fn sink<H: StreamHandler>(mut self, handler: H) -> Self {
        if let Some(id) = self.append(handler) {
            self.wire_previous(&id);
            self.previous = None;
        }
        self
    }

    /// Explicit connection by `"handler_id.port_name"` addresses, for fan-out
    /// or ports other than the defaults.
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        if self.error.is_none() {
            if let Some(runtime) = self.runtime.as_mut() {
                if let Err(e) = runtime.connect_by_id(from, to) {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    /// Id of the most recently added stage.
    pub fn last_id(&self) -> Option<&HandlerId> {
        self.stages.last().map(|(id, _)| id)
    }

    pub fn build(self) -> Result<Pipeline<C>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let runtime = self
            .runtime
            .ok_or_else(|| StreamError::Configuration("Pipeline has no runtime".into()))?;
        if self.stages.is_empty() {
            return Err(StreamError::Configuration("Pipeline has no stages".into()));
        }

        tracing::info!(
            "[Pipeline] Built {} stage(s), {} connection(s)",
            self.stages.len(),
            runtime.connections().len()
        );
        Ok(Pipeline {
            runtime,
            stages: self.stages,
        })
    }

    fn append<H: StreamHandler>(&mut self, handler: H) -> Option<HandlerId> {
        if self.error.is_some() {
            return None;
        }
        let runtime = self.runtime.as_mut()?;
        let dispatcher = handler.dispatcher();
        match runtime.add_handler(handler) {
            Ok(handle) => {
                let id = handle.id().clone();
                self.stages.push((id.clone(), dispatcher));
                Some(id)
            }
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }

    fn wire_previous(&mut self, id: &HandlerId) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        let Some(previous) = self.previous.as_ref() else {
            self.error = Some(StreamError::Configuration(format!(
                "Stage '{}' has nothing upstream to connect to",
                id
            )));
            return;
        };

        let from = runtime.default_output(previous).ok_or_else(|| {
            StreamError::PortNotFound(format!("{} has no output port", previous))
        });
        let to = runtime
            .default_input(id)
            .ok_or_else(|| StreamError::PortNotFound(format!("{} has no input port", id)));

        let wired = from.and_then(|from| to.and_then(|to| runtime.connect(&from, &to)));
        if let Err(e) = wired {
            self.error = Some(e);
        }
    }
}

/// A built pipeline: the runtime plus its stages in order.
pub struct Pipeline<C: Clock = SoftwareClock> {
    runtime: StreamRuntime<C>,
    stages: Vec<(HandlerId, Dispatcher)>,
}

impl<C: Clock> Pipeline<C> {
    /// Stage ids and dispatchers in the order they were added. Adapters are
    /// not stages.
    pub fn handlers(&self) -> &[(HandlerId, Dispatcher)] {
        &self.stages
    }

    pub fn start(&mut self) -> Result<()> {
        self.runtime.start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.runtime.stop()
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    pub fn status(&self) -> RuntimeStatus {
        self.runtime.status()
    }

    pub fn topology(&self) -> Topology {
        self.runtime.topology()
    }

    pub fn runtime(&self) -> &StreamRuntime<C> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut StreamRuntime<C> {
        &mut self.runtime
    }

    pub fn into_runtime(self) -> StreamRuntime<C> {
        self.runtime
    }
}
