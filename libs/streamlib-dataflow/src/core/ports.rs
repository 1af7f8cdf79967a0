// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Ports: named, typed attachment points on a handler.
//!
//! A handler declares [`PortSpec`]s. The runtime turns them into
//! [`InputPort`]s and [`OutputPort`]s and attaches one [`BufferCell`] per
//! connection. An output fans out by writing to every attached cell; an input
//! has at most one cell.

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::buffers::{BufferCell, ConsumptionPolicy};
use crate::core::error::{Result, StreamError};
use crate::core::handler::HandlerId;
use crate::core::messages::{Message, PayloadKind};

bitflags! {
    /// Where a port's buffers may reside.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const HOST = 1;
        const DEVICE = 1 << 1;
    }
}

impl Capabilities {
    /// Parse a comma-separated list of capability names (`"host,device"`).
    pub fn parse(names: &str) -> Result<Self> {
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(Capabilities::empty(), |caps, name| {
                let flag = match name {
                    "host" => Capabilities::HOST,
                    "device" => Capabilities::DEVICE,
                    other => {
                        return Err(StreamError::Configuration(format!(
                            "Unknown capability '{}' (expected 'host' or 'device')",
                            other
                        )));
                    }
                };
                Ok(caps | flag)
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Capabilities::HOST) {
            names.push("host");
        }
        if self.contains(Capabilities::DEVICE) {
            names.push("device");
        }
        names
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

/// Declaration of a port on a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    name: String,
    direction: PortDirection,
    kind: PayloadKind,
    capabilities: Capabilities,
    policy: Option<ConsumptionPolicy>,
}

impl PortSpec {
    /// Input port on host memory.
    pub fn input(name: impl Into<String>, kind: PayloadKind) -> Self {
        Self::new(name, PortDirection::Input, kind)
    }

    /// Output port on host memory.
    pub fn output(name: impl Into<String>, kind: PayloadKind) -> Self {
        Self::new(name, PortDirection::Output, kind)
    }

    fn new(name: impl Into<String>, direction: PortDirection, kind: PayloadKind) -> Self {
        Self {
            name: name.into(),
            direction,
            kind,
            capabilities: Capabilities::HOST,
            policy: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Override the consumption policy of the cell feeding this input.
    ///
    /// Without an override, audio inputs are ordered-all and everything else
    /// is latest-wins.
    pub fn with_policy(mut self, policy: ConsumptionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn policy_override(&self) -> Option<ConsumptionPolicy> {
        self.policy
    }
}

pub fn video_input(name: impl Into<String>) -> PortSpec {
    PortSpec::input(name, PayloadKind::Video)
}

pub fn video_output(name: impl Into<String>) -> PortSpec {
    PortSpec::output(name, PayloadKind::Video)
}

pub fn audio_input(name: impl Into<String>) -> PortSpec {
    PortSpec::input(name, PayloadKind::Audio)
}

pub fn audio_output(name: impl Into<String>) -> PortSpec {
    PortSpec::output(name, PayloadKind::Audio)
}

pub fn data_input(name: impl Into<String>) -> PortSpec {
    PortSpec::input(name, PayloadKind::Data)
}

pub fn data_output(name: impl Into<String>) -> PortSpec {
    PortSpec::output(name, PayloadKind::Data)
}

/// `handler_id.port_name`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortAddress {
    handler: HandlerId,
    port: String,
}

impl PortAddress {
    pub fn new(handler: HandlerId, port: impl Into<String>) -> Self {
        Self {
            handler,
            port: port.into(),
        }
    }

    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.handler, self.port)
    }
}

impl FromStr for PortAddress {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let (handler, port) = s.split_once('.').ok_or_else(|| {
            StreamError::Configuration(format!(
                "Invalid port address '{}' (expected 'handler_id.port_name')",
                s
            ))
        })?;
        if port.is_empty() {
            return Err(StreamError::Configuration(format!(
                "Invalid port address '{}': empty port name",
                s
            )));
        }
        Ok(Self::new(HandlerId::new(handler)?, port))
    }
}

/// Runtime side of an input port.
#[derive(Debug, Clone)]
pub struct InputPort {
    spec: PortSpec,
    cell: Option<Arc<BufferCell<Message>>>,
}

impl InputPort {
    pub fn new(spec: PortSpec) -> Self {
        Self { spec, cell: None }
    }

    pub(crate) fn attach(&mut self, cell: Arc<BufferCell<Message>>) {
        self.cell = Some(cell);
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn is_connected(&self) -> bool {
        self.cell.is_some()
    }

    pub fn cell(&self) -> Option<&Arc<BufferCell<Message>>> {
        self.cell.as_ref()
    }

    /// Read per the connected cell's policy, `None` when unconnected or empty.
    pub fn read(&self) -> Option<Message> {
        self.cell.as_ref()?.read()
    }

    /// Read, ignoring anything written after `cutoff`.
    pub fn read_before(&self, cutoff: Instant) -> Option<Message> {
        self.cell.as_ref()?.read_before(cutoff)
    }
}

/// Runtime side of an output port.
#[derive(Debug, Clone)]
pub struct OutputPort {
    spec: PortSpec,
    address: String,
    cells: Vec<Arc<BufferCell<Message>>>,
    next_sequence: Arc<AtomicU64>,
    write_timeout: Duration,
}

impl OutputPort {
    pub fn new(owner: &HandlerId, spec: PortSpec, write_timeout: Duration) -> Self {
        Self {
            address: format!("{}.{}", owner, spec.name()),
            spec,
            cells: Vec::new(),
            next_sequence: Arc::new(AtomicU64::new(0)),
            write_timeout,
        }
    }

    pub(crate) fn attach(&mut self, cell: Arc<BufferCell<Message>>) {
        self.cells.push(cell);
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn connection_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Arc<BufferCell<Message>>] {
        &self.cells
    }

    /// Hand a message to every connected cell.
    ///
    /// The message is stamped with this port's next sequence number. Kind and
    /// location must match the port declaration. Every cell receives the
    /// write even if an earlier one reports a dropped chunk; the first such
    /// error is returned.
    pub fn write(&self, message: Message) -> Result<()> {
        if message.kind() != self.spec.kind() {
            return Err(StreamError::KindMismatch {
                from: format!("message #{}", message.sequence_number()),
                from_kind: message.kind(),
                to: self.address.clone(),
                to_kind: self.spec.kind(),
            });
        }
        if !self
            .spec
            .capabilities()
            .intersects(message.location().capability())
        {
            return Err(StreamError::LocationMismatch {
                port: self.address.clone(),
                location: message.location().to_string(),
            });
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let message = message.with_sequence(sequence);

        let mut first_error = None;
        for cell in &self.cells {
            if let Err(e) = cell.write_timeout(message.clone(), self.write_timeout) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Messages accepted so far.
    pub fn messages_written(&self) -> u64 {
        self.next_sequence.load(Ordering::Relaxed)
    }
}

/// All ports of one handler, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct HandlerPorts {
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
}

impl HandlerPorts {
    pub fn from_specs(
        owner: &HandlerId,
        specs: Vec<PortSpec>,
        write_timeout: Duration,
    ) -> Result<Self> {
        let mut ports = Self::default();

        for spec in specs {
            let duplicate = match spec.direction() {
                PortDirection::Input => ports.input(spec.name()).is_some(),
                PortDirection::Output => ports.output(spec.name()).is_some(),
            };
            if duplicate {
                return Err(StreamError::Configuration(format!(
                    "Handler '{}' declares port '{}' twice",
                    owner,
                    spec.name()
                )));
            }

            match spec.direction() {
                PortDirection::Input => ports.inputs.push(InputPort::new(spec)),
                PortDirection::Output => {
                    ports
                        .outputs
                        .push(OutputPort::new(owner, spec, write_timeout))
                }
            }
        }

        Ok(ports)
    }

    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|port| port.name() == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|port| port.name() == name)
    }

    pub(crate) fn input_mut(&mut self, name: &str) -> Option<&mut InputPort> {
        self.inputs.iter_mut().find(|port| port.name() == name)
    }

    pub(crate) fn output_mut(&mut self, name: &str) -> Option<&mut OutputPort> {
        self.outputs.iter_mut().find(|port| port.name() == name)
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    /// First declared input.
    pub fn default_input(&self) -> Option<&InputPort> {
        self.inputs.first()
    }

    /// First declared output.
    pub fn default_output(&self) -> Option<&OutputPort> {
        self.outputs.first()
    }
}
