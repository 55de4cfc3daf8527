//! Error types for SlotKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::host::{HostError, UnitId};

/// Result type alias using SlotError
pub type Result<T> = std::result::Result<T, SlotError>;

/// Unified error type for SlotKV operations
#[derive(Debug, Error)]
pub enum SlotError {
    // -------------------------------------------------------------------------
    // Precondition Errors
    // -------------------------------------------------------------------------
    #[error("Store not ready: host environment has not been scanned yet")]
    NotReady,

    #[error("Invalid item id: {0}")]
    InvalidId(String),

    // -------------------------------------------------------------------------
    // Placement Errors
    // -------------------------------------------------------------------------
    #[error("Placement failed: {0}")]
    PlacementFailed(String),

    // -------------------------------------------------------------------------
    // Unit Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Orphan record in unit {unit} slot {slot}: label missing or undecodable")]
    OrphanRecord { unit: UnitId, slot: usize },

    #[error("Storage unit vanished: {0}")]
    UnitVanished(UnitId),

    // -------------------------------------------------------------------------
    // Invariant Violations
    // -------------------------------------------------------------------------
    #[error("Inconsistent slot: {0}")]
    InconsistentSlot(String),

    #[error("Storage unit already registered: {0}")]
    DuplicateUnit(UnitId),

    // -------------------------------------------------------------------------
    // Host Errors
    // -------------------------------------------------------------------------
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SlotError {
    /// Whether this error signals a broken store invariant rather than a
    /// transient host condition
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SlotError::InconsistentSlot(_) | SlotError::DuplicateUnit(_))
    }
}
