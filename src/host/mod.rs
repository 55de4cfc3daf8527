//! Host Module
//!
//! The boundary to the external environment that owns the storage units.
//!
//! ## Responsibilities
//! - Define the outbound RPC surface (`Host` trait)
//! - Define the payload (`Item`) and unit handle types
//! - Deliver inbound lifecycle notifications (`event`)
//!
//! The host offers fixed-capacity units with numbered slots and nothing
//! else: no metadata channel, no transactions. Units may disappear at any
//! time, so every call can fail with `UnitNotFound`.

mod event;
mod memory;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use event::{EventBus, HostEvent, Subscription};
pub use memory::{MemoryHost, MemoryHostOptions};

/// Result type for host calls
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Failures reported by the host environment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    #[error("slot {slot} out of range for unit {unit}")]
    SlotOutOfRange { unit: UnitId, slot: usize },

    #[error("host rejected request: {0}")]
    Rejected(String),

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Stable identifier of a storage unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in the host environment
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another location
    pub fn distance(&self, other: &Location) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Handle to a storage unit as reported by the host
#[derive(Debug, Clone, PartialEq)]
pub struct UnitHandle {
    pub id: UnitId,
    pub kind: String,
    pub location: Location,
}

/// An opaque payload occupying one slot
///
/// `label` is the only free-form field the host carries with a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub content: Bytes,
    pub label: Option<String>,
}

impl Item {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Outbound RPC surface of the host environment
///
/// Every method re-validates the unit on the host side; a unit destroyed
/// between two calls surfaces as `HostError::UnitNotFound`.
#[async_trait]
pub trait Host: Send + Sync {
    /// Materialize a new unit; it may not be ready immediately
    async fn create_unit(&self, location: &Location, kind: &str) -> HostResult<UnitHandle>;

    /// Destroy a unit together with its contents
    async fn destroy_unit(&self, unit: &UnitId) -> HostResult<()>;

    /// List units of `kind` within `radius` of `location`
    async fn query_units(
        &self,
        kind: &str,
        location: &Location,
        radius: f64,
    ) -> HostResult<Vec<UnitHandle>>;

    /// Slot count of a unit, or `None` while it is missing, not ready, or
    /// has no inventory
    async fn capacity(&self, unit: &UnitId) -> Option<usize>;

    async fn read_slot(&self, unit: &UnitId, slot: usize) -> HostResult<Option<Item>>;

    async fn write_slot(&self, unit: &UnitId, slot: usize, item: Option<Item>) -> HostResult<()>;

    async fn owner_tag(&self, unit: &UnitId) -> HostResult<Option<String>>;

    async fn set_owner_tag(&self, unit: &UnitId, tag: &str) -> HostResult<()>;
}
