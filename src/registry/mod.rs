//! Registry Module
//!
//! Tracks which host units belong to this store and which item ids sit in
//! which of their slots.
//!
//! ## Responsibilities
//! - Maintain the unit map in registration order
//! - Maintain the unit index (unit → slot → item id) and its reverse lookup
//! - React to host lifecycle notifications: ready, appeared, vanished
//! - Rebuild the cache by scanning the slots of newly registered units
//!
//! ## Index Invariants
//! - An item id occupies at most one slot across all units
//! - A unit is registered at most once; registering it again is an
//!   invariant violation (`SlotError::DuplicateUnit`)
//! - Once no write is in flight, the indexed ids equal the cache's keys

mod index;
pub(crate) mod lifecycle;

pub use index::{UnitRegistry, UnitSummary};

use crate::host::UnitId;

/// Outcome of scanning one unit's slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub unit: UnitId,
    pub capacity: usize,

    /// Items indexed and cached
    pub indexed: usize,

    /// Payloads whose label did not decode
    pub orphans: usize,

    /// Payloads whose id was already indexed elsewhere
    pub duplicates: usize,

    /// Whether the unit vanished before the scan completed
    pub aborted: bool,
}

impl ScanReport {
    fn new(unit: UnitId, capacity: usize) -> Self {
        Self {
            unit,
            capacity,
            ..Self::default()
        }
    }
}
