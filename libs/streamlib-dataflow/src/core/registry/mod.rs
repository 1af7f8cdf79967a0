// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Actor naming and the process-wide registry.
//!
//! The global registry is created lazily on first use. Tests that touch it
//! call [`reset`] (clear entries) or [`teardown`] (drop it entirely) and run
//! with `#[serial]`.

mod actor_registry;
mod stub;
mod uri;

pub use actor_registry::{ActorRef, ActorRegistry};
pub use stub::{ActorStub, LocalActorStub, RemoteActorStub};
pub use uri::{ACTOR_SCHEME, ActorUri, LOCAL_HOST, UriError};

use parking_lot::Mutex;
use std::sync::Arc;

use crate::core::error::Result;

static GLOBAL_REGISTRY: Mutex<Option<Arc<ActorRegistry>>> = parking_lot::const_mutex(None);

/// Process-wide registry, created on first use.
pub fn global_registry() -> Arc<ActorRegistry> {
    let mut slot = GLOBAL_REGISTRY.lock();
    Arc::clone(slot.get_or_insert_with(|| {
        tracing::debug!("[Registry] Initializing global actor registry");
        Arc::new(ActorRegistry::new())
    }))
}

/// Install a fresh, empty global registry.
pub fn init() -> Arc<ActorRegistry> {
    let registry = Arc::new(ActorRegistry::new());
    *GLOBAL_REGISTRY.lock() = Some(Arc::clone(&registry));
    registry
}

/// Clear every entry from the global registry, if it exists.
pub fn reset() {
    if let Some(registry) = GLOBAL_REGISTRY.lock().as_ref() {
        registry.clear();
    }
}

/// Drop the global registry. The next access creates a new one.
pub fn teardown() {
    GLOBAL_REGISTRY.lock().take();
}

pub fn lookup(uri: &ActorUri) -> Option<ActorRef> {
    global_registry().lookup(uri)
}

pub fn unregister(uri: &ActorUri) -> Result<ActorRef> {
    global_registry().unregister(uri)
}

pub fn find_by_class(class_name: &str) -> Vec<ActorRef> {
    global_registry().find_by_class(class_name)
}

pub fn find_by_instance_id(instance_id: &str) -> Vec<ActorRef> {
    global_registry().find_by_instance_id(instance_id)
}

pub fn connect_actor(uri: &str) -> Result<ActorStub> {
    global_registry().connect_actor(uri)
}
