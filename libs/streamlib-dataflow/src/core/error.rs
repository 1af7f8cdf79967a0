// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::core::messages::PayloadKind;
use crate::core::registry::UriError;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid actor URI: {0}")]
    InvalidUri(#[from] UriError),

    #[error("Payload kind mismatch: {from} carries {from_kind}, {to} expects {to_kind}")]
    KindMismatch {
        from: String,
        from_kind: PayloadKind,
        to: String,
        to_kind: PayloadKind,
    },

    #[error("No adapter can route {from} [{from_caps}] to {to} [{to_caps}]")]
    UnsatisfiableRoute {
        from: String,
        from_caps: String,
        to: String,
        to_caps: String,
    },

    #[error("Message location {location} is not declared by port {port}")]
    LocationMismatch { port: String, location: String },

    #[error("Input port already connected: {0}")]
    InputAlreadyConnected(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("Handler already exists: {0}")]
    DuplicateHandler(String),

    #[error("Actor already registered: {0}")]
    DuplicateUri(String),

    #[error("Actor not registered: {0}")]
    UriNotFound(String),

    #[error("Port range [{start}, {end}) exhausted")]
    PortRangeExhausted { start: u16, end: u16 },

    #[error("Port {0} is not allocated")]
    PortNotAllocated(u16),

    #[error("Buffer full, chunk dropped on {0}")]
    BufferFull(String),

    #[error("Handler '{handler}' failed to start: {source}")]
    StartFailed {
        handler: String,
        #[source]
        source: Box<StreamError>,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
