// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Location-bridging adapters and the static route table used to pick them.
//!
//! When a connection joins ports whose capability sets are disjoint, the
//! runtime splices one adapter between them. An adapter route fits when its
//! input capabilities intersect the producer's and its output capabilities
//! intersect the consumer's. Among fitting routes the narrowest one wins,
//! measured as input plus output capability count, ties going to table order.

use crate::core::context::ProcessContext;
use crate::core::error::Result;
use crate::core::handler::{BoxedHandler, StreamHandler};
use crate::core::messages::{Location, Message, PayloadKind};
use crate::core::ports::{Capabilities, PortSpec};

pub(crate) const ADAPTER_INPUT: &str = "in";
pub(crate) const ADAPTER_OUTPUT: &str = "out";

/// Parameters every adapter constructor receives.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AdapterParams {
    pub kind: PayloadKind,
    pub device_pool_id: u32,
}

pub(crate) struct AdapterRoute {
    pub name: &'static str,
    pub input: Capabilities,
    pub output: Capabilities,
    pub build: fn(AdapterParams) -> BoxedHandler,
}

impl AdapterRoute {
    fn fits(&self, from: Capabilities, to: Capabilities) -> bool {
        self.input.intersects(from) && self.output.intersects(to)
    }

    /// Capabilities accepted plus capabilities produced.
    fn breadth(&self) -> u32 {
        self.input.bits().count_ones() + self.output.bits().count_ones()
    }
}

pub(crate) static ADAPTER_ROUTES: &[AdapterRoute] = &[
    AdapterRoute {
        name: "HostToDeviceAdapter",
        input: Capabilities::HOST,
        output: Capabilities::DEVICE,
        build: build_host_to_device,
    },
    AdapterRoute {
        name: "DeviceToHostAdapter",
        input: Capabilities::DEVICE,
        output: Capabilities::HOST,
        build: build_device_to_host,
    },
];

fn build_host_to_device(params: AdapterParams) -> BoxedHandler {
    Box::new(HostToDeviceAdapter::new(params.kind, params.device_pool_id))
}

fn build_device_to_host(params: AdapterParams) -> BoxedHandler {
    Box::new(DeviceToHostAdapter::new(params.kind))
}

/// Pick the adapter route bridging `from` to `to`, if any.
pub(crate) fn select_route(
    routes: &'static [AdapterRoute],
    from: Capabilities,
    to: Capabilities,
) -> Option<&'static AdapterRoute> {
    routes
        .iter()
        .enumerate()
        .filter(|(_, route)| route.fits(from, to))
        .min_by_key(|(index, route)| (route.breadth(), *index))
        .map(|(_, route)| route)
}

/// Read the adapter input, skipping a latest-wins value already forwarded.
fn fresh(ctx: &ProcessContext<'_>, last_sequence: &mut Option<u64>) -> Result<Option<Message>> {
    match ctx.read(ADAPTER_INPUT)? {
        Some(message) if *last_sequence != Some(message.sequence_number()) => {
            *last_sequence = Some(message.sequence_number());
            Ok(Some(message))
        }
        _ => Ok(None),
    }
}

/// Copies each message into a pool buffer and re-tags it as device memory.
pub struct HostToDeviceAdapter {
    kind: PayloadKind,
    pool: u32,
    last_sequence: Option<u64>,
}

impl HostToDeviceAdapter {
    pub fn new(kind: PayloadKind, pool: u32) -> Self {
        Self {
            kind,
            pool,
            last_sequence: None,
        }
    }
}

impl StreamHandler for HostToDeviceAdapter {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input(ADAPTER_INPUT, self.kind).with_capabilities(Capabilities::HOST),
            PortSpec::output(ADAPTER_OUTPUT, self.kind).with_capabilities(Capabilities::DEVICE),
        ]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let Some(message) = fresh(ctx, &mut self.last_sequence)? else {
            return Ok(());
        };

        let mut upload = ctx.acquire_buffer(message.data().len());
        upload.copy_from_slice(message.data());
        let moved = message.relocated(Location::Device { pool: self.pool }, upload.freeze());

        ctx.write(ADAPTER_OUTPUT, moved)
    }
}

/// Copies each message out of device memory back to the host.
pub struct DeviceToHostAdapter {
    kind: PayloadKind,
    last_sequence: Option<u64>,
}

impl DeviceToHostAdapter {
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            last_sequence: None,
        }
    }
}

impl StreamHandler for DeviceToHostAdapter {
    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input(ADAPTER_INPUT, self.kind).with_capabilities(Capabilities::DEVICE),
            PortSpec::output(ADAPTER_OUTPUT, self.kind).with_capabilities(Capabilities::HOST),
        ]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let Some(message) = fresh(ctx, &mut self.last_sequence)? else {
            return Ok(());
        };

        let mut readback = ctx.acquire_buffer(message.data().len());
        readback.copy_from_slice(message.data());
        let moved = message.relocated(Location::Host, readback.freeze());

        ctx.write(ADAPTER_OUTPUT, moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: AdapterParams) -> BoxedHandler {
        Box::new(DeviceToHostAdapter::new(PayloadKind::Data))
    }

    #[test]
    fn test_select_host_to_device() {
        let route = select_route(ADAPTER_ROUTES, Capabilities::HOST, Capabilities::DEVICE).unwrap();
        assert_eq!(route.name, "HostToDeviceAdapter");

        let route = select_route(ADAPTER_ROUTES, Capabilities::DEVICE, Capabilities::HOST).unwrap();
        assert_eq!(route.name, "DeviceToHostAdapter");
    }

    #[test]
    fn test_no_route_for_empty_capabilities() {
        assert!(select_route(ADAPTER_ROUTES, Capabilities::empty(), Capabilities::DEVICE).is_none());
        assert!(select_route(ADAPTER_ROUTES, Capabilities::HOST, Capabilities::empty()).is_none());
    }

    #[test]
    fn test_precedence_smallest_superset_then_table_order() {
        static ROUTES: &[AdapterRoute] = &[
            AdapterRoute {
                name: "Universal",
                input: Capabilities::all(),
                output: Capabilities::all(),
                build: noop,
            },
            AdapterRoute {
                name: "NarrowA",
                input: Capabilities::HOST,
                output: Capabilities::DEVICE,
                build: noop,
            },
            AdapterRoute {
                name: "NarrowB",
                input: Capabilities::HOST,
                output: Capabilities::DEVICE,
                build: noop,
            },
        ];

        let route = select_route(ROUTES, Capabilities::HOST, Capabilities::DEVICE).unwrap();
        assert_eq!(route.name, "NarrowA");
        assert!(ROUTES[1].breadth() < ROUTES[0].breadth());

        // Only the universal route reaches host on the output side.
        let route = select_route(ROUTES, Capabilities::HOST, Capabilities::HOST).unwrap();
        assert_eq!(route.name, "Universal");
    }

    #[test]
    fn test_adapter_port_shapes() {
        let params = AdapterParams {
            kind: PayloadKind::Video,
            device_pool_id: 3,
        };
        let adapter = (ADAPTER_ROUTES[0].build)(params);
        let ports = adapter.ports();
        assert_eq!(ports[0].capabilities(), Capabilities::HOST);
        assert_eq!(ports[1].capabilities(), Capabilities::DEVICE);
        assert_eq!(ports[1].kind(), PayloadKind::Video);
        assert_eq!(adapter.class_name(), "HostToDeviceAdapter");
    }
}
