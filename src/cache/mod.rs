//! Cache Module
//!
//! In-memory mapping of item id → item, the only source for reads.
//!
//! ## Responsibilities
//! - Serve every read query without touching the host
//! - Hand out clones so callers cannot mutate cached items
//! - Mirror exactly the records indexed in registered units
//!
//! ## Data Structure Choice
//! HashMap wrapped in RwLock: lookups by id dominate, and no ordering is
//! promised to callers.

mod table;

pub use table::ItemCache;

use crate::host::Item;

/// An item together with the id it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub item: Item,
}
