//! Store Module
//!
//! The public façade that coordinates codec, registry, placement and cache.
//!
//! ## Responsibilities
//! - Expose set/get/remove/clear/list over item ids
//! - Process host lifecycle notifications in delivery order
//! - Convert host failures into `false` results; only precondition and
//!   invariant errors escape
//!
//! ## Concurrency Model: Single Logical Actor
//!
//! - All methods take `&self`; state lives behind short-lived locks that are
//!   never held across an await
//! - Operations suspend while waiting on the host, so two calls (or a call
//!   and a notification) may interleave at those points
//! - Callers that need atomicity across several calls serialize themselves

use std::sync::Arc;

use serde::Serialize;

use crate::cache::Record;
use crate::codec::{LabelCodec, PrefixLabelCodec};
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, SlotError};
use crate::host::{Host, HostEvent, Item, Subscription, UnitId};
use crate::placement::PlacementEngine;
use crate::registry::{lifecycle, ScanReport, UnitSummary};

/// Point-in-time counters for a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub ready: bool,
    pub units: usize,
    pub items: usize,
    pub total_capacity: usize,
    pub occupied_slots: usize,
    pub unit_details: Vec<UnitSummary>,
}

/// A keyed item store over host storage units
pub struct Store<H: Host> {
    ctx: StoreContext<H>,
}

impl<H: Host> Store<H> {
    /// Create a store using the prefix label codec from the config
    pub fn new(config: Config, host: Arc<H>) -> Result<Self> {
        let codec = PrefixLabelCodec::new(config.label_prefix.clone());
        Self::with_codec(config, host, Box::new(codec))
    }

    /// Create a store with a custom id encoding
    pub fn with_codec(config: Config, host: Arc<H>, codec: Box<dyn LabelCodec>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: StoreContext::new(config, host, codec),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Process events until the subscription closes
    ///
    /// Events are handled strictly one after another. Errors are logged and
    /// do not stop the loop.
    pub async fn run(&self, mut subscription: Subscription) {
        while let Some(event) = subscription.recv().await {
            match self.handle_event(event).await {
                Ok(()) => {}
                Err(e) if e.is_invariant_violation() => {
                    tracing::error!("Event handling broke a store invariant: {}", e);
                }
                Err(e) => tracing::warn!("Event handling failed: {}", e),
            }
        }
        tracing::debug!(store = %self.ctx.config.store_id, "Event stream closed");
    }

    /// Process a single host notification
    pub async fn handle_event(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Ready => {
                lifecycle::on_host_ready(&self.ctx).await?;
            }
            HostEvent::UnitAppeared(handle) => {
                lifecycle::on_unit_appeared(&self.ctx, handle).await?;
            }
            HostEvent::UnitVanished(unit) => {
                lifecycle::on_unit_vanished(&self.ctx, &unit);
            }
        }
        Ok(())
    }

    /// Discover existing units and mark the store ready
    ///
    /// Equivalent to receiving the host's ready notification; a no-op once
    /// the store is ready.
    pub async fn initialize(&self) -> Result<Vec<ScanReport>> {
        lifecycle::on_host_ready(&self.ctx).await
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ctx.is_ready() {
            Ok(())
        } else {
            Err(SlotError::NotReady)
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store an item under `id`, replacing any existing item
    ///
    /// Returns `Ok(false)` when the item could not be placed; the caller
    /// should retry later. Replacement removes the old item first, so a
    /// failed replace leaves neither.
    pub async fn set_item(&self, item: Item, id: &str) -> Result<bool> {
        self.ensure_ready()?;
        self.ctx.codec.validate_id(id)?;

        if self.ctx.cache.contains(id) {
            self.remove_item(id).await?;
        }

        let encoded = self.ctx.codec.encode(item, id)?;
        let placement = match PlacementEngine::new(&self.ctx).place(&encoded, id).await {
            Ok(placement) => placement,
            Err(SlotError::PlacementFailed(reason)) => {
                tracing::warn!(id = %id, "Could not store item: {}", reason);
                return Ok(false);
            }
            Err(e) => {
                tracing::error!(id = %id, "Placement invariant broken: {}", e);
                return Err(e);
            }
        };

        self.ctx.cache.insert(id.to_string(), self.ctx.codec.strip(encoded));
        tracing::debug!(
            id = %id,
            unit = %placement.unit,
            slot = placement.slot,
            created_unit = placement.created_unit,
            "Stored item"
        );
        Ok(true)
    }

    /// Remove the item stored under `id`
    ///
    /// Returns `Ok(false)` if the id is unknown. Bookkeeping is dropped even
    /// when the host slot cannot be cleared.
    pub async fn remove_item(&self, id: &str) -> Result<bool> {
        if !self.ctx.cache.contains(id) {
            return Ok(false);
        }

        let Some((unit, slot)) = self.ctx.registry.locate(id) else {
            tracing::warn!(id = %id, "Cached item has no indexed slot, dropping");
            self.ctx.cache.remove(id);
            return Ok(true);
        };

        let outcome = self.clear_slot(&unit, slot, id).await;

        self.ctx.registry.release_slot(&unit, slot, id);
        self.ctx.cache.remove(id);
        outcome.map(|()| true)
    }

    /// Clear a slot after checking it still holds `id`
    async fn clear_slot(&self, unit: &UnitId, slot: usize, id: &str) -> Result<()> {
        let host = &self.ctx.host;
        match host.read_slot(unit, slot).await {
            Ok(Some(item)) if self.ctx.codec.decode(&item).as_deref() == Some(id) => {
                if let Err(e) = host.write_slot(unit, slot, None).await {
                    tracing::warn!(unit = %unit, slot, id = %id, "Slot clear not confirmed: {}", e);
                }
                Ok(())
            }
            Ok(Some(_)) => {
                tracing::error!(unit = %unit, slot, id = %id, "Indexed slot holds a different item");
                Err(SlotError::InconsistentSlot(format!(
                    "unit {} slot {} does not hold item {:?}",
                    unit, slot, id
                )))
            }
            Ok(None) => {
                tracing::warn!(unit = %unit, slot, id = %id, "Slot already empty on the host");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(unit = %unit, slot, id = %id, "Slot removal not confirmed: {}", e);
                Ok(())
            }
        }
    }

    /// Destroy every registered unit and forget all items
    ///
    /// Best effort: destroy failures are logged and skipped. Allowed before
    /// the store is ready; units registered by a discovery still in progress
    /// are destroyed and the rest of that scan is abandoned.
    pub async fn clear(&self) -> Result<()> {
        // Reset bookkeeping first so writes issued meanwhile go to fresh units
        let handles = self.ctx.registry.drain();
        self.ctx.cache.clear();

        for handle in &handles {
            if let Err(e) = self.ctx.host.destroy_unit(&handle.id).await {
                tracing::warn!(unit = %handle.id, "Could not destroy unit: {}", e);
            }
        }
        tracing::info!(units = handles.len(), "Cleared store");
        Ok(())
    }

    // =========================================================================
    // Reads (cache only)
    // =========================================================================

    /// Get a copy of the item stored under `id`
    pub fn get_item(&self, id: &str) -> Option<Item> {
        self.ctx.cache.get(id)
    }

    pub fn contains_item(&self, id: &str) -> bool {
        self.ctx.cache.contains(id)
    }

    /// Snapshot of all stored items
    pub fn get_all_items(&self) -> Result<Vec<Record>> {
        self.ensure_ready()?;
        Ok(self.ctx.cache.snapshot())
    }

    /// Snapshot of all stored ids
    pub fn get_all_item_ids(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        Ok(self.ctx.cache.ids())
    }

    pub fn len(&self) -> usize {
        self.ctx.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.cache.is_empty()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> StoreStats {
        let unit_details = self.ctx.registry.summaries();
        StoreStats {
            ready: self.ctx.is_ready(),
            units: unit_details.len(),
            items: self.ctx.cache.len(),
            total_capacity: unit_details.iter().map(|u| u.capacity).sum(),
            occupied_slots: unit_details.iter().map(|u| u.occupancy).sum(),
            unit_details,
        }
    }

    /// Registered unit ids, in registration order
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.ctx.registry.unit_ids()
    }

    /// Ids indexed under a unit, in slot order
    pub fn unit_items(&self, unit: &UnitId) -> Option<Vec<String>> {
        self.ctx.registry.record_ids(unit)
    }

    /// Unit and slot an id is indexed under
    pub fn locate(&self, id: &str) -> Option<(UnitId, usize)> {
        self.ctx.registry.locate(id)
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn host(&self) -> &Arc<H> {
        &self.ctx.host
    }
}
