// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Connection graph and capability negotiation.
//!
//! A logical connection joins one output to one input. When the two ports
//! share a capability it is a single buffer cell. Otherwise the runtime picks
//! an adapter route, adds the adapter as a handler, and the logical
//! connection becomes two physical links through it.
//!
//! Every check runs before anything is mutated, so a failed `connect` leaves
//! the graph exactly as it was.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::adapters::{ADAPTER_INPUT, ADAPTER_OUTPUT, ADAPTER_ROUTES, AdapterParams, AdapterRoute, select_route};
use super::runtime::StreamRuntime;
use crate::core::buffers::{BufferCell, CellStats, ConsumptionPolicy};
use crate::core::clocks::Clock;
use crate::core::error::{Result, StreamError};
use crate::core::handler::HandlerId;
use crate::core::messages::{Message, PayloadKind};
use crate::core::ports::PortAddress;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One buffer cell between an output and an input.
#[derive(Debug, Clone)]
pub struct Link {
    from: PortAddress,
    to: PortAddress,
    cell: Arc<BufferCell<Message>>,
}

impl Link {
    pub fn from(&self) -> &PortAddress {
        &self.from
    }

    pub fn to(&self) -> &PortAddress {
        &self.to
    }

    pub fn policy(&self) -> ConsumptionPolicy {
        self.cell.policy()
    }

    pub fn stats(&self) -> CellStats {
        self.cell.stats()
    }

    /// Messages waiting in the cell.
    pub fn pending(&self) -> usize {
        self.cell.len()
    }

    /// Whether the consumer was disabled and writes are being discarded.
    pub fn is_closed(&self) -> bool {
        self.cell.is_closed()
    }
}

/// A connection as requested by the caller, possibly bridged by an adapter.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    from: PortAddress,
    to: PortAddress,
    kind: PayloadKind,
    adapter: Option<HandlerId>,
    links: Vec<Link>,
}

impl Connection {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn from(&self) -> &PortAddress {
        &self.from
    }

    pub fn to(&self) -> &PortAddress {
        &self.to
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Adapter handler inserted to bridge capabilities, if any.
    pub fn adapter(&self) -> Option<&HandlerId> {
        self.adapter.as_ref()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }
}

/// Outcome of validating a connect request.
struct ConnectionPlan {
    kind: PayloadKind,
    /// The consumer's effective policy. Every link of the connection uses it.
    policy: ConsumptionPolicy,
    route: Option<&'static AdapterRoute>,
}

impl<C: Clock> StreamRuntime<C> {
    /// Connect an output port to an input port.
    ///
    /// Fails with `KindMismatch` when the payload kinds differ,
    /// `InputAlreadyConnected` when the input already has a producer, and
    /// `UnsatisfiableRoute` when the capability sets are disjoint and no
    /// adapter bridges them. On failure nothing is changed.
    pub fn connect(&mut self, from: &PortAddress, to: &PortAddress) -> Result<ConnectionId> {
        self.ensure_idle("connect ports")?;
        let plan = self.plan_connection(from, to)?;

        let id = ConnectionId::new(format!("conn_{}", self.next_connection_id));
        self.next_connection_id += 1;

        let (adapter, links) = match plan.route {
            None => (None, vec![self.link(from, to, plan.policy)?]),
            Some(route) => {
                let params = AdapterParams {
                    kind: plan.kind,
                    device_pool_id: self.config.device_pool_id,
                };
                let adapter_id = self.next_handler_id(route.name)?;
                self.insert_handler(adapter_id.clone(), (route.build)(params), true)?;

                let adapter_in = PortAddress::new(adapter_id.clone(), ADAPTER_INPUT);
                let adapter_out = PortAddress::new(adapter_id.clone(), ADAPTER_OUTPUT);
                let upstream = self.link(from, &adapter_in, plan.policy)?;
                let downstream = self.link(&adapter_out, to, plan.policy)?;
                (Some(adapter_id), vec![upstream, downstream])
            }
        };

        for link in &links {
            self.graph.add_link(link.from.handler(), link.to.handler(), &id);
        }

        match &adapter {
            Some(adapter_id) => tracing::info!(
                "[Runtime] Connected {} -> {} via {} ({})",
                from,
                to,
                adapter_id,
                id
            ),
            None => tracing::info!("[Runtime] Connected {} -> {} ({})", from, to, id),
        }

        self.connections.push(Connection {
            id: id.clone(),
            from: from.clone(),
            to: to.clone(),
            kind: plan.kind,
            adapter,
            links,
        });
        Ok(id)
    }

    /// `connect` with `"handler_id.port_name"` addresses.
    pub fn connect_by_id(&mut self, from: &str, to: &str) -> Result<ConnectionId> {
        let from: PortAddress = from.parse()?;
        let to: PortAddress = to.parse()?;
        self.connect(&from, &to)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|connection| connection.id() == id)
    }

    /// Number of adapters the runtime has inserted.
    pub fn adapter_count(&self) -> usize {
        self.handlers
            .iter()
            .filter(|entry| entry.record.is_adapter())
            .count()
    }

    fn plan_connection(&self, from: &PortAddress, to: &PortAddress) -> Result<ConnectionPlan> {
        let producer = self
            .entry(from.handler())
            .ok_or_else(|| StreamError::HandlerNotFound(from.handler().to_string()))?;
        let consumer = self
            .entry(to.handler())
            .ok_or_else(|| StreamError::HandlerNotFound(to.handler().to_string()))?;

        let output = match producer.ports.output(from.port()) {
            Some(output) => output,
            None if producer.ports.input(from.port()).is_some() => {
                return Err(StreamError::Configuration(format!(
                    "{} is an input; connections start at an output",
                    from
                )));
            }
            None => return Err(StreamError::PortNotFound(from.to_string())),
        };
        let input = match consumer.ports.input(to.port()) {
            Some(input) => input,
            None if consumer.ports.output(to.port()).is_some() => {
                return Err(StreamError::Configuration(format!(
                    "{} is an output; connections end at an input",
                    to
                )));
            }
            None => return Err(StreamError::PortNotFound(to.to_string())),
        };

        let kind = output.spec().kind();
        if kind != input.spec().kind() {
            return Err(StreamError::KindMismatch {
                from: from.to_string(),
                from_kind: kind,
                to: to.to_string(),
                to_kind: input.spec().kind(),
            });
        }

        if input.is_connected() {
            return Err(StreamError::InputAlreadyConnected(to.to_string()));
        }
        if let Some(ConsumptionPolicy::OrderedAll { capacity: 0 }) = input.spec().policy_override() {
            return Err(StreamError::Configuration(format!(
                "{} declares an ordered queue with capacity 0",
                to
            )));
        }
        let policy = input
            .spec()
            .policy_override()
            .unwrap_or_else(|| self.config.policy_for(kind));

        let from_caps = output.spec().capabilities();
        let to_caps = input.spec().capabilities();
        if from_caps.intersects(to_caps) {
            return Ok(ConnectionPlan {
                kind,
                policy,
                route: None,
            });
        }

        match select_route(ADAPTER_ROUTES, from_caps, to_caps) {
            Some(route) => {
                tracing::debug!(
                    "[Runtime] {} [{}] -> {} [{}] needs {}",
                    from,
                    from_caps,
                    to,
                    to_caps,
                    route.name
                );
                Ok(ConnectionPlan {
                    kind,
                    policy,
                    route: Some(route),
                })
            }
            None => Err(StreamError::UnsatisfiableRoute {
                from: from.to_string(),
                from_caps: from_caps.to_string(),
                to: to.to_string(),
                to_caps: to_caps.to_string(),
            }),
        }
    }

    /// Create the cell for one physical link and attach it to both ports.
    fn link(
        &mut self,
        from: &PortAddress,
        to: &PortAddress,
        policy: ConsumptionPolicy,
    ) -> Result<Link> {
        let consumer = self
            .entry_mut(to.handler())
            .ok_or_else(|| StreamError::HandlerNotFound(to.handler().to_string()))?;
        let input = Arc::make_mut(&mut consumer.ports)
            .input_mut(to.port())
            .ok_or_else(|| StreamError::PortNotFound(to.to_string()))?;

        let cell = Arc::new(BufferCell::new(policy).with_label(format!("{} -> {}", from, to)));
        input.attach(Arc::clone(&cell));

        let producer = self
            .entry_mut(from.handler())
            .ok_or_else(|| StreamError::HandlerNotFound(from.handler().to_string()))?;
        Arc::make_mut(&mut producer.ports)
            .output_mut(from.port())
            .ok_or_else(|| StreamError::PortNotFound(from.to_string()))?
            .attach(Arc::clone(&cell));

        Ok(Link {
            from: from.clone(),
            to: to.clone(),
            cell,
        })
    }

    /// Handlers reachable from `id` along links, not including `id`.
    pub(crate) fn downstream_of(&self, id: &HandlerId) -> BTreeSet<HandlerId> {
        self.graph.downstream_of(id)
    }

    /// Whether the connection graph contains a feedback loop.
    pub fn has_feedback_loop(&self) -> bool {
        self.graph.has_cycle()
    }
}
