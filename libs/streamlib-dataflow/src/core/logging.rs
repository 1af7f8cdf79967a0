// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tracing subscriber setup for binaries and tests embedding the runtime.
//!
//! The filter comes from `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::error::{Result, StreamError};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn try_init() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| StreamError::Runtime(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the global fmt subscriber, ignoring an existing one.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
