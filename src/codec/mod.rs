//! Codec Module
//!
//! Carries the item id inside the payload's label field, since the host
//! offers no other metadata channel.
//!
//! ## Label Format
//! ```text
//! ┌────────┬──────────┬────────┬──────────────────┐
//! │ PREFIX │    id    │ PREFIX │  original label  │
//! └────────┴──────────┴────────┴──────────────────┘
//! ```
//!
//! Decoding splits on the first two prefix occurrences. Ids containing the
//! prefix are refused at encode time, so the original label round-trips
//! even when it contains the prefix itself.

mod label;

pub use label::PrefixLabelCodec;

use crate::error::Result;
use crate::host::Item;

/// Encoding of an item id into a payload
///
/// Kept behind a trait so the store can move to a side-channel encoding on
/// hosts that offer one.
pub trait LabelCodec: Send + Sync {
    /// Wrap `id` into the item's label, keeping the caller's label recoverable
    fn encode(&self, item: Item, id: &str) -> Result<Item>;

    /// Extract the id, or `None` if the label is absent or foreign
    fn decode(&self, item: &Item) -> Option<String>;

    /// Return the item with its label restored to the caller's original
    fn strip(&self, item: Item) -> Item;

    /// Check that an id can be carried without ambiguity
    fn validate_id(&self, id: &str) -> Result<()>;
}
