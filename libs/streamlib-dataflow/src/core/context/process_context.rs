// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-tick view handed to [`StreamHandler::process`](crate::core::handler::StreamHandler::process).

use std::time::Instant;

use super::{BufferPool, PooledBuffer};
use crate::core::clocks::Tick;
use crate::core::error::{Result, StreamError};
use crate::core::events::TickHistory;
use crate::core::handler::HandlerId;
use crate::core::messages::Message;
use crate::core::ports::{HandlerPorts, InputPort, OutputPort};

pub struct ProcessContext<'a> {
    tick: Tick,
    handler_id: &'a HandlerId,
    ports: &'a HandlerPorts,
    pool: &'a BufferPool,
    history: &'a TickHistory,
    started_at: Instant,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        tick: Tick,
        handler_id: &'a HandlerId,
        ports: &'a HandlerPorts,
        pool: &'a BufferPool,
        history: &'a TickHistory,
    ) -> Self {
        Self {
            tick,
            handler_id,
            ports,
            pool,
            history,
            started_at: Instant::now(),
        }
    }

    pub fn tick(&self) -> &Tick {
        &self.tick
    }

    pub fn frame_number(&self) -> u64 {
        self.tick.frame_number
    }

    pub fn handler_id(&self) -> &HandlerId {
        self.handler_id
    }

    /// Latest instant whose writes this tick may observe: when processing
    /// of this tick began, or when the following tick was issued if that
    /// happened first.
    pub fn read_cutoff(&self) -> Instant {
        match self.history.issued_after(self.tick.frame_number) {
            Some(next_issued) => next_issued.min(self.started_at),
            None => self.started_at,
        }
    }

    /// Read one message from an input, per its cell's consumption policy.
    ///
    /// Only messages written before [`read_cutoff`](Self::read_cutoff) are
    /// visible. Returns `Ok(None)` when the input is unconnected or has
    /// nothing yet.
    pub fn read(&self, port: &str) -> Result<Option<Message>> {
        Ok(self.input(port)?.read_before(self.read_cutoff()))
    }

    /// Write one message to an output, fanning out to every connection.
    pub fn write(&self, port: &str, message: Message) -> Result<()> {
        self.output(port)?.write(message)
    }

    pub fn input(&self, name: &str) -> Result<&'a InputPort> {
        self.ports
            .input(name)
            .ok_or_else(|| StreamError::PortNotFound(format!("{}.{}", self.handler_id, name)))
    }

    pub fn output(&self, name: &str) -> Result<&'a OutputPort> {
        self.ports
            .output(name)
            .ok_or_else(|| StreamError::PortNotFound(format!("{}.{}", self.handler_id, name)))
    }

    /// Borrow a zeroed buffer from the runtime pool for this tick.
    pub fn acquire_buffer(&self, len: usize) -> PooledBuffer<'a> {
        self.pool.acquire(len)
    }
}
