// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod buffers;
pub mod clocks;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod messages;
pub mod pipeline;
pub mod port_allocator;
pub mod ports;
pub mod registry;
pub mod runtime;
pub mod scheduling;
pub mod topology;

pub use buffers::{BufferCell, CellStats, ConsumptionPolicy};
pub use clocks::{Clock, SoftwareClock, Tick};
pub use config::{PortRange, RuntimeConfig, StartPolicy};
pub use context::{BufferPool, BufferPoolStats, HandlerContext, PooledBuffer, ProcessContext};
pub use error::{Result, StreamError};
pub use events::{TickBroadcaster, TickHistory};
pub use handler::{
    BoxedHandler, HandlerId, HandlerRecord, HandlerStats, HandlerStatsSnapshot, LifecycleState,
    StreamHandler,
};
pub use messages::{Location, MediaInfo, Message, Payload, PayloadKind};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use port_allocator::PortAllocator;
pub use ports::{
    Capabilities, HandlerPorts, InputPort, OutputPort, PortAddress, PortDirection, PortSpec,
    audio_input, audio_output, data_input, data_output, video_input, video_output,
};
pub use registry::{
    ActorRef, ActorRegistry, ActorStub, ActorUri, LocalActorStub, RemoteActorStub, UriError,
};
pub use runtime::{
    Connection, ConnectionId, DeviceToHostAdapter, HandlerHandle, HandlerStatus, HostToDeviceAdapter,
    Link, RuntimeState, RuntimeStatus, StreamRuntime,
};
pub use scheduling::Dispatcher;
pub use topology::{Edge, NodeInfo, PortInfo, Topology};
