//! Configuration for SlotKV
//!
//! Centralized configuration with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};
use crate::host::Location;

/// Main configuration for a store instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Store instance identifier, written as the owner tag on every unit.
    /// Must be unique among stores sharing the same unit kind and location.
    pub store_id: String,

    // -------------------------------------------------------------------------
    // Unit Configuration
    // -------------------------------------------------------------------------
    /// Kind of storage unit requested from the host
    pub unit_kind: String,

    /// Fixed rendezvous location where new units are materialized
    pub rendezvous: Location,

    /// Radius around the rendezvous searched for pre-existing units
    pub discovery_radius: f64,

    // -------------------------------------------------------------------------
    // Label Configuration
    // -------------------------------------------------------------------------
    /// Marker wrapped around the item id inside the label field
    pub label_prefix: String,

    // -------------------------------------------------------------------------
    // Pacing Configuration
    // -------------------------------------------------------------------------
    /// Slots processed per batch before yielding back to the scheduler
    pub scan_batch_size: usize,

    /// How long to wait for a freshly created unit to become ready (milliseconds)
    pub spawn_ready_timeout_ms: u64,

    /// Poll interval while waiting for unit readiness (milliseconds)
    pub spawn_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_id: "slotkv".to_string(),
            unit_kind: "chest".to_string(),
            rendezvous: Location::default(),
            discovery_radius: 8.0,
            label_prefix: "\u{00A7}kv\u{00A7}".to_string(),
            scan_batch_size: 9,
            spawn_ready_timeout_ms: 2000,
            spawn_poll_interval_ms: 50,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| SlotError::Serialization(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for values the store cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.store_id.is_empty() {
            return Err(SlotError::Config("store_id must not be empty".to_string()));
        }
        if self.label_prefix.is_empty() {
            return Err(SlotError::Config("label_prefix must not be empty".to_string()));
        }
        if self.scan_batch_size == 0 {
            return Err(SlotError::Config("scan_batch_size must be at least 1".to_string()));
        }
        if self.spawn_poll_interval_ms == 0 {
            return Err(SlotError::Config(
                "spawn_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.discovery_radius.is_nan() || self.discovery_radius < 0.0 {
            return Err(SlotError::Config(format!(
                "discovery_radius must be non-negative, got {}",
                self.discovery_radius
            )));
        }
        Ok(())
    }

    pub fn spawn_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_ready_timeout_ms)
    }

    pub fn spawn_poll_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_poll_interval_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store identifier (owner tag)
    pub fn store_id(mut self, id: impl Into<String>) -> Self {
        self.config.store_id = id.into();
        self
    }

    /// Set the kind of unit requested from the host
    pub fn unit_kind(mut self, kind: impl Into<String>) -> Self {
        self.config.unit_kind = kind.into();
        self
    }

    /// Set the rendezvous location for new units
    pub fn rendezvous(mut self, location: Location) -> Self {
        self.config.rendezvous = location;
        self
    }

    /// Set the discovery radius around the rendezvous
    pub fn discovery_radius(mut self, radius: f64) -> Self {
        self.config.discovery_radius = radius;
        self
    }

    /// Set the label prefix marker
    pub fn label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.label_prefix = prefix.into();
        self
    }

    /// Set the number of slots handled per scheduler slice
    pub fn scan_batch_size(mut self, size: usize) -> Self {
        self.config.scan_batch_size = size;
        self
    }

    /// Set the readiness timeout for new units (in milliseconds)
    pub fn spawn_ready_timeout_ms(mut self, ms: u64) -> Self {
        self.config.spawn_ready_timeout_ms = ms;
        self
    }

    /// Set the readiness poll interval (in milliseconds)
    pub fn spawn_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.spawn_poll_interval_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
