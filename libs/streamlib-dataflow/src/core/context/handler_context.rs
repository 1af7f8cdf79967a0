// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use crate::core::handler::HandlerId;
use crate::core::ports::HandlerPorts;

/// What a handler can see while starting up.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    id: HandlerId,
    fps: f64,
    ports: Arc<HandlerPorts>,
}

impl HandlerContext {
    pub(crate) fn new(id: HandlerId, fps: f64, ports: Arc<HandlerPorts>) -> Self {
        Self { id, fps, ports }
    }

    pub fn handler_id(&self) -> &HandlerId {
        &self.id
    }

    /// Nominal tick rate of the runtime.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Wired ports. Connections are fixed once the runtime is started.
    pub fn ports(&self) -> &HandlerPorts {
        &self.ports
    }

    pub fn is_input_connected(&self, name: &str) -> bool {
        self.ports
            .input(name)
            .is_some_and(|port| port.is_connected())
    }
}
