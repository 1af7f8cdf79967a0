// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod adapters;
mod connections;
mod graph;
mod lifecycle;
#[allow(clippy::module_inception)]
mod runtime;
mod status;
mod workers;

pub use adapters::{DeviceToHostAdapter, HostToDeviceAdapter};
pub use connections::{Connection, ConnectionId, Link};
pub use runtime::{HandlerHandle, RuntimeState, StreamRuntime};
pub use status::{HandlerStatus, RuntimeStatus};
