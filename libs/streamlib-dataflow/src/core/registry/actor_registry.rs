// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Directory of live handlers keyed by actor URI.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::stub::{ActorStub, LocalActorStub, RemoteActorStub};
use super::ActorUri;
use crate::core::error::{Result, StreamError};
use crate::core::handler::{HandlerId, HandlerRecord};

/// Registry entry: a URI and the handler it names.
#[derive(Debug, Clone)]
pub struct ActorRef {
    uri: ActorUri,
    record: Arc<HandlerRecord>,
}

impl ActorRef {
    pub fn uri(&self) -> &ActorUri {
        &self.uri
    }

    pub fn handler_id(&self) -> &HandlerId {
        self.record.id()
    }

    pub fn class_name(&self) -> &str {
        self.record.class_name()
    }

    pub fn record(&self) -> &Arc<HandlerRecord> {
        &self.record
    }

    pub fn is_running(&self) -> bool {
        self.record.is_running()
    }
}

#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: Mutex<BTreeMap<ActorUri, ActorRef>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `streamlib://local/<ClassName>/<handler id>`.
    pub fn register(&self, record: &Arc<HandlerRecord>) -> Result<ActorUri> {
        let uri = ActorUri::local(record.class_name(), record.id().as_str())?;

        let mut actors = self.actors.lock();
        if actors.contains_key(&uri) {
            return Err(StreamError::DuplicateUri(uri.to_string()));
        }

        actors.insert(
            uri.clone(),
            ActorRef {
                uri: uri.clone(),
                record: Arc::clone(record),
            },
        );
        tracing::debug!("[Registry] Registered {}", uri);
        Ok(uri)
    }

    /// Local URIs match regardless of which local host spelling is used.
    pub fn lookup(&self, uri: &ActorUri) -> Option<ActorRef> {
        if !uri.is_local() {
            return None;
        }
        self.actors.lock().get(&uri.to_local()).cloned()
    }

    pub fn unregister(&self, uri: &ActorUri) -> Result<ActorRef> {
        let removed = if uri.is_local() {
            self.actors.lock().remove(&uri.to_local())
        } else {
            None
        };

        match removed {
            Some(actor) => {
                tracing::debug!("[Registry] Unregistered {}", actor.uri());
                Ok(actor)
            }
            None => Err(StreamError::UriNotFound(uri.to_string())),
        }
    }

    pub fn find_by_class(&self, class_name: &str) -> Vec<ActorRef> {
        self.actors
            .lock()
            .values()
            .filter(|actor| actor.class_name() == class_name)
            .cloned()
            .collect()
    }

    pub fn find_by_instance_id(&self, instance_id: &str) -> Vec<ActorRef> {
        self.actors
            .lock()
            .values()
            .filter(|actor| actor.uri().instance_id() == instance_id)
            .cloned()
            .collect()
    }

    /// Resolve a URI string to a stub.
    ///
    /// Local hosts resolve to the registered handler (or `UriNotFound`).
    /// Any other host yields a remote placeholder.
    pub fn connect_actor(&self, uri: &str) -> Result<ActorStub> {
        let uri: ActorUri = uri.parse()?;

        if !uri.is_local() {
            tracing::debug!("[Registry] {} is remote, returning placeholder stub", uri);
            return Ok(ActorStub::Remote(RemoteActorStub::new(uri)));
        }

        self.lookup(&uri)
            .map(|actor| ActorStub::Local(LocalActorStub::new(actor)))
            .ok_or_else(|| StreamError::UriNotFound(uri.to_string()))
    }

    pub fn list(&self) -> Vec<ActorUri> {
        self.actors.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.lock().is_empty()
    }

    pub fn clear(&self) {
        self.actors.lock().clear();
    }
}
