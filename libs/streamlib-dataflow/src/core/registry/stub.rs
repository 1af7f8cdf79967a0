// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::{ActorRef, ActorUri};

/// Result of resolving a URI with [`ActorRegistry::connect_actor`](super::ActorRegistry::connect_actor).
#[derive(Debug, Clone)]
pub enum ActorStub {
    Local(LocalActorStub),
    Remote(RemoteActorStub),
}

impl ActorStub {
    pub fn uri(&self) -> &ActorUri {
        match self {
            ActorStub::Local(stub) => stub.uri(),
            ActorStub::Remote(stub) => stub.uri(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ActorStub::Local(_))
    }

    pub fn is_running(&self) -> bool {
        match self {
            ActorStub::Local(stub) => stub.is_running(),
            ActorStub::Remote(stub) => stub.is_running(),
        }
    }

    /// The live actor, for local stubs.
    pub fn actor(&self) -> Option<&ActorRef> {
        match self {
            ActorStub::Local(stub) => Some(stub.actor()),
            ActorStub::Remote(_) => None,
        }
    }
}

/// Wraps a live handler in this process.
#[derive(Debug, Clone)]
pub struct LocalActorStub {
    actor: ActorRef,
}

impl LocalActorStub {
    pub(crate) fn new(actor: ActorRef) -> Self {
        Self { actor }
    }

    pub fn uri(&self) -> &ActorUri {
        self.actor.uri()
    }

    pub fn actor(&self) -> &ActorRef {
        &self.actor
    }

    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }
}

/// Placeholder for an actor on another host. There is no transport yet, so
/// it always reports not running.
#[derive(Debug, Clone)]
pub struct RemoteActorStub {
    uri: ActorUri,
}

impl RemoteActorStub {
    pub(crate) fn new(uri: ActorUri) -> Self {
        Self { uri }
    }

    pub fn uri(&self) -> &ActorUri {
        &self.uri
    }

    pub fn host(&self) -> &str {
        self.uri.host()
    }

    pub fn is_running(&self) -> bool {
        false
    }
}
