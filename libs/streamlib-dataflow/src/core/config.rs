// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime configuration, loadable from YAML or TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::buffers::ConsumptionPolicy;
use crate::core::error::{Result, StreamError};
use crate::core::messages::PayloadKind;
use crate::core::port_allocator::PortAllocator;

/// What `start()` does when a handler's `on_start` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Stop the handlers already started (reverse order) and fail `start()`.
    #[default]
    Rollback,
    /// Disable the failed handler and everything downstream of it; the rest
    /// of the graph runs.
    Isolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub fps: f64,
    /// Bounded wait for in-flight `process` calls on stop.
    pub stop_grace_ms: u64,
    /// Pending ticks per handler before ticks are dropped for it.
    pub tick_queue_depth: usize,
    pub ordered_queue_capacity: usize,
    /// Bounded wait for a slot on a full ordered-all cell.
    pub ordered_write_timeout_ms: u64,
    pub start_policy: StartPolicy,
    /// Register handlers in the global actor registry when added.
    pub auto_register: bool,
    pub port_range: Option<PortRange>,
    /// Pool id stamped on messages moved to device memory by adapters.
    pub device_pool_id: u32,
    pub pool_max_retained: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            stop_grace_ms: 500,
            tick_queue_depth: 4,
            ordered_queue_capacity: 32,
            ordered_write_timeout_ms: 5,
            start_policy: StartPolicy::Rollback,
            auto_register: true,
            port_range: None,
            device_pool_id: 0,
            pool_max_retained: 16,
        }
    }
}

impl RuntimeConfig {
    pub fn with_fps(fps: f64) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| StreamError::Configuration(format!("Failed to parse YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StreamError::Configuration(format!("Failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(StreamError::Configuration(format!(
                "Unsupported config file type: {} (expected .yaml, .yml or .toml)",
                path.display()
            ))),
        }?;

        tracing::info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(StreamError::Configuration(format!(
                "fps must be a finite positive number, got {}",
                self.fps
            )));
        }
        if self.tick_queue_depth == 0 {
            return Err(StreamError::Configuration(
                "tick_queue_depth must be at least 1".into(),
            ));
        }
        if self.ordered_queue_capacity == 0 {
            return Err(StreamError::Configuration(
                "ordered_queue_capacity must be at least 1".into(),
            ));
        }
        if let Some(range) = self.port_range {
            PortAllocator::new(range.start, range.end)?;
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn ordered_write_timeout(&self) -> Duration {
        Duration::from_millis(self.ordered_write_timeout_ms)
    }

    /// Cell policy for a connection carrying `kind`: audio is never dropped,
    /// everything else is latest-wins.
    pub fn policy_for(&self, kind: PayloadKind) -> ConsumptionPolicy {
        match kind {
            PayloadKind::Audio => ConsumptionPolicy::OrderedAll {
                capacity: self.ordered_queue_capacity,
            },
            PayloadKind::Video | PayloadKind::Data => ConsumptionPolicy::LatestWins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fps, 30.0);
        assert_eq!(config.start_policy, StartPolicy::Rollback);
        assert_eq!(config.stop_grace(), Duration::from_millis(500));
        assert!(config.auto_register);
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = RuntimeConfig::from_yaml_str(
            "fps: 60\nstart_policy: isolate\nport_range:\n  start: 30000\n  end: 30020\n",
        )
        .unwrap();
        assert_eq!(config.fps, 60.0);
        assert_eq!(config.start_policy, StartPolicy::Isolate);
        assert_eq!(
            config.port_range,
            Some(PortRange {
                start: 30000,
                end: 30020
            })
        );
        assert_eq!(config.tick_queue_depth, 4);
    }

    #[test]
    fn test_from_toml() {
        let config =
            RuntimeConfig::from_toml_str("fps = 24.0\nordered_queue_capacity = 8\nauto_register = false\n")
                .unwrap();
        assert_eq!(config.fps, 24.0);
        assert_eq!(config.ordered_queue_capacity, 8);
        assert!(!config.auto_register);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RuntimeConfig::from_yaml_str("fps: 0").is_err());
        assert!(RuntimeConfig::from_yaml_str("fps: -5").is_err());
        assert!(RuntimeConfig::from_yaml_str("tick_queue_depth: 0").is_err());
        assert!(RuntimeConfig::from_yaml_str("port_range: {start: 3, end: 10}").is_err());
        assert!(RuntimeConfig::from_yaml_str("unknown_field: 1").is_err());
        assert!(RuntimeConfig::from_toml_str("fps = \"fast\"").is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("runtime.yaml");
        std::fs::File::create(&yaml_path)
            .unwrap()
            .write_all(b"fps: 50\n")
            .unwrap();
        assert_eq!(RuntimeConfig::load(&yaml_path).unwrap().fps, 50.0);

        let toml_path = dir.path().join("runtime.toml");
        std::fs::write(&toml_path, "stop_grace_ms = 100\n").unwrap();
        assert_eq!(RuntimeConfig::load(&toml_path).unwrap().stop_grace_ms, 100);

        let other = dir.path().join("runtime.json");
        std::fs::write(&other, "{}").unwrap();
        assert!(RuntimeConfig::load(&other).is_err());

        assert!(RuntimeConfig::load(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_policy_for_kind() {
        let config = RuntimeConfig::default();
        assert_eq!(config.policy_for(PayloadKind::Video), ConsumptionPolicy::LatestWins);
        assert_eq!(config.policy_for(PayloadKind::Data), ConsumptionPolicy::LatestWins);
        assert_eq!(
            config.policy_for(PayloadKind::Audio),
            ConsumptionPolicy::OrderedAll { capacity: 32 }
        );
    }
}
