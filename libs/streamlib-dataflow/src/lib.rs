// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tick-driven dataflow runtime.
//!
//! A clock broadcasts ticks to handlers. Handlers exchange messages through
//! buffer cells on typed ports; the runtime inserts location adapters where
//! connected ports share no memory capability. Handlers are addressable by
//! actor URI through the registry.

#![allow(clippy::type_complexity)] // Complex types are clear in context
#![allow(clippy::new_without_default)]

pub mod core;

pub use crate::core::{
    ActorRegistry, ActorStub, ActorUri, BoxedHandler, BufferCell, BufferPool, Capabilities,
    Clock, ConsumptionPolicy, Dispatcher, HandlerContext, HandlerHandle, HandlerId, LifecycleState,
    Location, Message, PayloadKind, Pipeline, PipelineBuilder, PortAddress, PortAllocator,
    PortSpec, ProcessContext, Result, RuntimeConfig, RuntimeState, RuntimeStatus, SoftwareClock,
    StartPolicy, StreamError, StreamHandler, StreamRuntime, Tick, Topology, audio_input,
    audio_output, data_input, data_output, video_input, video_output,
};
pub use crate::core::{logging, registry};
