//! Placement Module
//!
//! Decides which unit and slot receive a new item.
//!
//! ## Policy
//! - First fit: walk registered units in registration order and take the
//!   lowest slot that is both untracked and empty on the host
//! - Only when every registered unit is full, materialize a new unit at the
//!   rendezvous, wait for it to become ready, tag it with the store id and
//!   write into slot 0
//!
//! ## Failure Handling
//! Host failures end as `SlotError::PlacementFailed` and never leave a
//! claim behind. A failure on an existing unit stops placement rather than
//! spilling into a new unit, and a new unit that cannot take its first item
//! is destroyed again. A new unit whose first free slot is not slot 0 is an
//! invariant violation (`SlotError::InconsistentSlot`).

mod engine;

pub use engine::Placement;
pub(crate) use engine::PlacementEngine;
