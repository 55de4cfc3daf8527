//! Placement engine implementation

use tokio::time::{sleep, Instant};

use crate::context::StoreContext;
use crate::error::{Result, SlotError};
use crate::host::{Host, HostError, Item, UnitHandle, UnitId};

/// Where an item was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub unit: UnitId,
    pub slot: usize,
    /// Whether a unit had to be created for it
    pub created_unit: bool,
}

/// Outcome of trying one existing unit
enum Attempt {
    Placed(usize),
    /// No usable free slot; move on to the next unit
    Full,
    /// The host failed; placement stops here
    Failed(SlotError),
}

pub(crate) struct PlacementEngine<'a, H: Host> {
    ctx: &'a StoreContext<H>,
}

impl<'a, H: Host> PlacementEngine<'a, H> {
    pub(crate) fn new(ctx: &'a StoreContext<H>) -> Self {
        Self { ctx }
    }

    /// Write an encoded item into the first unit with room
    ///
    /// On success the slot is claimed in the unit index under `id`; the
    /// caller owns the cache insert. A new unit is created only when every
    /// registered unit is full; a host failure on an existing unit ends
    /// placement instead.
    pub(crate) async fn place(&self, item: &Item, id: &str) -> Result<Placement> {
        for unit in self.ctx.registry.unit_ids() {
            match self.try_unit(&unit, item, id).await {
                Attempt::Placed(slot) => {
                    tracing::debug!(unit = %unit, slot, id = %id, "Placed item in existing unit");
                    return Ok(Placement {
                        unit,
                        slot,
                        created_unit: false,
                    });
                }
                Attempt::Full => {}
                Attempt::Failed(e) => return Err(e),
            }
        }

        self.place_in_new_unit(item, id).await
    }

    // =========================================================================
    // Existing Units
    // =========================================================================

    /// Try each free slot of a unit
    async fn try_unit(&self, unit: &UnitId, item: &Item, id: &str) -> Attempt {
        let registry = &self.ctx.registry;
        if !registry.has_room(unit) {
            return Attempt::Full;
        }

        let Some(capacity) = self.ctx.host.capacity(unit).await else {
            tracing::warn!(unit = %unit, "Registered unit reports no inventory, skipping");
            return Attempt::Full;
        };

        let batch = self.ctx.config.scan_batch_size;
        for slot in 0..capacity {
            if slot > 0 && slot % batch == 0 {
                tokio::task::yield_now().await;
            }
            if !registry.is_slot_free(unit, slot) {
                // Unit gone or slot tracked; a vanished unit has no free slots
                if !registry.contains(unit) {
                    return Attempt::Full;
                }
                continue;
            }

            match self.ctx.host.read_slot(unit, slot).await {
                Ok(None) => {}
                // Occupied by an orphan the index does not track
                Ok(Some(_)) => continue,
                Err(HostError::UnitNotFound(_)) => return Attempt::Full,
                Err(e) => {
                    return Attempt::Failed(SlotError::PlacementFailed(format!(
                        "slot check on unit {} slot {} failed: {}",
                        unit, slot, e
                    )));
                }
            }

            if !registry.claim_slot(unit, slot, id) {
                if registry.locate(id).is_some() {
                    return Attempt::Failed(SlotError::PlacementFailed(format!(
                        "id {:?} was placed concurrently",
                        id
                    )));
                }
                // Lost the slot to a concurrent placement while suspended
                continue;
            }

            return match self.write_claimed(unit, slot, item, id).await {
                Ok(()) => Attempt::Placed(slot),
                Err(e) => Attempt::Failed(e),
            };
        }

        Attempt::Full
    }

    // =========================================================================
    // New Units
    // =========================================================================

    async fn place_in_new_unit(&self, item: &Item, id: &str) -> Result<Placement> {
        let config = &self.ctx.config;
        let host = &self.ctx.host;

        let handle = host
            .create_unit(&config.rendezvous, &config.unit_kind)
            .await
            .map_err(|e| SlotError::PlacementFailed(format!("host refused new unit: {}", e)))?;
        tracing::info!(unit = %handle.id, "Created storage unit");

        let capacity = self.await_ready(&handle).await?;

        if let Err(e) = host.set_owner_tag(&handle.id, &config.store_id).await {
            self.discard(&handle.id).await;
            return Err(SlotError::PlacementFailed(format!(
                "cannot tag unit {}: {}",
                handle.id, e
            )));
        }

        let unit = handle.id.clone();
        let registry = &self.ctx.registry;
        if registry.locate(id).is_some() {
            // A concurrent call stored the same id while this unit spawned
            self.abandon(&unit).await;
            return Err(SlotError::PlacementFailed(format!(
                "id {:?} was placed concurrently",
                id
            )));
        }
        if registry.contains(&unit) {
            // The appearance handler saw the tag first and registered it empty
            if !registry.claim_slot(&unit, 0, id) {
                return Err(SlotError::PlacementFailed(format!(
                    "slot 0 of new unit {} was taken by a concurrent placement",
                    unit
                )));
            }
        } else {
            registry.register_claiming(handle, capacity, 0, id)?;
        }

        match host.read_slot(&unit, 0).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                registry.release_slot(&unit, 0, id);
                tracing::error!(unit = %unit, "Freshly created unit is not empty");
                return Err(SlotError::InconsistentSlot(format!(
                    "first write into new unit {} would not land in slot 0",
                    unit
                )));
            }
            Err(e) => {
                registry.release_slot(&unit, 0, id);
                self.abandon(&unit).await;
                return Err(SlotError::PlacementFailed(format!(
                    "new unit {} unreadable: {}",
                    unit, e
                )));
            }
        }

        if let Err(e) = self.write_claimed(&unit, 0, item, id).await {
            self.abandon(&unit).await;
            return Err(e);
        }
        tracing::debug!(unit = %unit, id = %id, "Placed item in new unit");

        Ok(Placement {
            unit,
            slot: 0,
            created_unit: true,
        })
    }

    /// Poll until the unit reports a capacity or the timeout elapses
    async fn await_ready(&self, handle: &UnitHandle) -> Result<usize> {
        let deadline = Instant::now() + self.ctx.config.spawn_ready_timeout();
        loop {
            match self.ctx.host.capacity(&handle.id).await {
                Some(0) => break,
                Some(capacity) => return Ok(capacity),
                None if Instant::now() >= deadline => break,
                None => sleep(self.ctx.config.spawn_poll_interval()).await,
            }
        }

        self.discard(&handle.id).await;
        Err(SlotError::PlacementFailed(format!(
            "unit {} never became ready with a valid inventory",
            handle.id
        )))
    }

    /// Drop a freshly created unit unless a concurrent placement claimed
    /// one of its slots
    async fn abandon(&self, unit: &UnitId) {
        let registry = &self.ctx.registry;
        if registry.occupancy(unit).unwrap_or(0) > 0 {
            return;
        }
        registry.deregister(unit);
        self.discard(unit).await;
    }

    /// Destroy a unit this engine created but could not use
    async fn discard(&self, unit: &UnitId) {
        if let Err(e) = self.ctx.host.destroy_unit(unit).await {
            tracing::warn!(unit = %unit, "Could not discard unusable unit: {}", e);
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write into a slot already claimed for `id`, releasing the claim on
    /// failure
    async fn write_claimed(&self, unit: &UnitId, slot: usize, item: &Item, id: &str) -> Result<()> {
        let registry = &self.ctx.registry;

        if let Err(e) = self.ctx.host.write_slot(unit, slot, Some(item.clone())).await {
            registry.release_slot(unit, slot, id);
            return Err(SlotError::PlacementFailed(format!(
                "write to unit {} slot {} failed: {}",
                unit, slot, e
            )));
        }

        // The unit may have vanished while the write was in flight
        if !registry.holds(unit, slot, id) {
            return Err(SlotError::PlacementFailed(format!(
                "unit {} vanished during write",
                unit
            )));
        }
        Ok(())
    }
}
