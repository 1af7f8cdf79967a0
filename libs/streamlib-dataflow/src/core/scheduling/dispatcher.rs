// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a handler's per-tick work executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatcher {
    /// Shares the runtime's cooperative scheduler. `process` must return
    /// promptly every tick.
    Cooperative,

    /// Runs on a dedicated OS thread. `process` may block (device reads,
    /// windowing-system calls) without stalling other handlers.
    Isolated,
}

impl Dispatcher {
    pub fn is_isolated(&self) -> bool {
        matches!(self, Dispatcher::Isolated)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::Cooperative
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatcher::Cooperative => write!(f, "cooperative"),
            Dispatcher::Isolated => write!(f, "isolated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_default() {
        assert_eq!(Dispatcher::default(), Dispatcher::Cooperative);
        assert!(!Dispatcher::default().is_isolated());
        assert!(Dispatcher::Isolated.is_isolated());
    }

    #[test]
    fn test_dispatcher_serde() {
        let json = serde_json::to_string(&Dispatcher::Isolated).unwrap();
        assert_eq!(json, "\"isolated\"");
        let parsed: Dispatcher = serde_json::from_str("\"cooperative\"").unwrap();
        assert_eq!(parsed, Dispatcher::Cooperative);
    }
}
