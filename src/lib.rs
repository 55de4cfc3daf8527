//! # SlotKV
//!
//! A keyed item store built on a host that only offers fixed-capacity
//! storage units:
//! - Items are packed first-fit into units; new units are created on demand
//! - Item ids travel inside the payload label (no metadata channel)
//! - Units appearing or vanishing are tracked from host notifications
//! - All reads are served from an in-memory cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Store Façade                           │
//! │          (set / get / remove / clear / list items)           │
//! └──────────┬───────────────────┬──────────────────┬───────────┘
//!            │                   │                  │
//!            ▼                   ▼                  ▼
//!   ┌─────────────────┐  ┌──────────────┐   ┌─────────────┐
//!   │    Placement    │  │   Registry   │   │    Cache    │
//!   │   (first fit)   │  │ (unit index) │◄──┤  (RwLock)   │
//!   └────────┬────────┘  └──────┬───────┘   └─────────────┘
//!            │                  │  ▲
//!            │    Label Codec   │  │ lifecycle events
//!            ▼                  ▼  │
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │                 Host (units, slots, tags)                    │
//!   └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod host;
pub mod codec;
pub mod cache;
pub mod registry;
pub mod placement;
pub mod store;

mod context;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SlotError};
pub use config::Config;
pub use cache::Record;
pub use host::{EventBus, Host, HostEvent, Item, Location, MemoryHost, UnitHandle, UnitId};
pub use store::{Store, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SlotKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
