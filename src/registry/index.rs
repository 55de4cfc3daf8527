//! Unit map and slot index

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Result, SlotError};
use crate::host::{UnitHandle, UnitId};

/// A registered unit and the ids believed to occupy its slots
struct UnitEntry {
    handle: UnitHandle,
    slots: Vec<Option<String>>,
}

impl UnitEntry {
    fn new(handle: UnitHandle, capacity: usize) -> Self {
        Self {
            handle,
            slots: vec![None; capacity],
        }
    }

    fn occupancy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Ids in slot order
    fn record_ids(&self) -> Vec<String> {
        self.slots.iter().flatten().cloned().collect()
    }
}

/// Per-unit occupancy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSummary {
    pub id: UnitId,
    pub capacity: usize,
    pub occupancy: usize,
}

#[derive(Default)]
struct RegistryInner {
    /// Registered units, in registration order
    units: Vec<UnitEntry>,

    /// Reverse index: item id → (unit, slot)
    locations: HashMap<String, (UnitId, usize)>,
}

impl RegistryInner {
    fn unit(&self, id: &UnitId) -> Option<&UnitEntry> {
        self.units.iter().find(|u| &u.handle.id == id)
    }

    fn unit_mut(&mut self, id: &UnitId) -> Option<&mut UnitEntry> {
        self.units.iter_mut().find(|u| &u.handle.id == id)
    }
}

/// Registered units and the unit index
///
/// ## Concurrency:
/// - One RwLock guards the unit list and the reverse index together so the
///   two never disagree
/// - All methods use `&self` and never hold the lock across an await
pub struct UnitRegistry {
    inner: RwLock<RegistryInner>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    // =========================================================================
    // Unit Map
    // =========================================================================

    pub fn contains(&self, unit: &UnitId) -> bool {
        self.inner.read().unit(unit).is_some()
    }

    /// Register a unit with all slots untracked
    ///
    /// Registering the same unit twice is an invariant violation.
    pub fn register(&self, handle: UnitHandle, capacity: usize) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.unit(&handle.id).is_some() {
            return Err(SlotError::DuplicateUnit(handle.id));
        }
        inner.units.push(UnitEntry::new(handle, capacity));
        Ok(())
    }

    /// Register a fresh unit with one slot already claimed for `id`
    pub fn register_claiming(
        &self,
        handle: UnitHandle,
        capacity: usize,
        slot: usize,
        id: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.unit(&handle.id).is_some() {
            return Err(SlotError::DuplicateUnit(handle.id));
        }
        if slot >= capacity {
            return Err(SlotError::InconsistentSlot(format!(
                "slot {} beyond capacity {} of new unit {}",
                slot, capacity, handle.id
            )));
        }
        if inner.locations.contains_key(id) {
            return Err(SlotError::InconsistentSlot(format!(
                "id {:?} already indexed while claiming new unit {}",
                id, handle.id
            )));
        }

        let unit_id = handle.id.clone();
        let mut entry = UnitEntry::new(handle, capacity);
        entry.slots[slot] = Some(id.to_string());
        inner.units.push(entry);
        inner.locations.insert(id.to_string(), (unit_id, slot));
        Ok(())
    }

    /// Remove a unit, returning the ids it held in slot order
    pub fn deregister(&self, unit: &UnitId) -> Option<Vec<String>> {
        let mut inner = self.inner.write();
        let pos = inner.units.iter().position(|u| &u.handle.id == unit)?;
        let entry = inner.units.remove(pos);
        let ids = entry.record_ids();
        for id in &ids {
            inner.locations.remove(id);
        }
        Some(ids)
    }

    /// Remove every unit, returning their handles in registration order
    pub fn drain(&self) -> Vec<UnitHandle> {
        let mut inner = self.inner.write();
        inner.locations.clear();
        inner.units.drain(..).map(|u| u.handle).collect()
    }

    /// Registered unit ids, in registration order
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.inner
            .read()
            .units
            .iter()
            .map(|u| u.handle.id.clone())
            .collect()
    }

    pub fn unit_count(&self) -> usize {
        self.inner.read().units.len()
    }

    // =========================================================================
    // Slot Index
    // =========================================================================

    /// Whether a unit's tracked occupancy is below its capacity
    pub fn has_room(&self, unit: &UnitId) -> bool {
        self.inner
            .read()
            .unit(unit)
            .map(|u| u.occupancy() < u.slots.len())
            .unwrap_or(false)
    }

    /// Whether a slot is registered and untracked
    pub fn is_slot_free(&self, unit: &UnitId, slot: usize) -> bool {
        matches!(
            self.inner.read().unit(unit).and_then(|u| u.slots.get(slot)),
            Some(None)
        )
    }

    /// Record `id` as occupying a slot
    ///
    /// Fails (returns false) if the unit is gone, the slot is taken, or the
    /// id is already indexed elsewhere.
    pub fn claim_slot(&self, unit: &UnitId, slot: usize, id: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.locations.contains_key(id) {
            return false;
        }
        let claimed = match inner.unit_mut(unit).and_then(|u| u.slots.get_mut(slot)) {
            Some(target) if target.is_none() => {
                *target = Some(id.to_string());
                true
            }
            _ => false,
        };
        if claimed {
            inner.locations.insert(id.to_string(), (unit.clone(), slot));
        }
        claimed
    }

    /// Whether a slot is still claimed by `id`
    pub fn holds(&self, unit: &UnitId, slot: usize, id: &str) -> bool {
        matches!(
            self.inner.read().locations.get(id),
            Some((u, s)) if u == unit && *s == slot
        )
    }

    /// Release a slot claimed by `id`; a no-op if someone else holds it
    pub fn release_slot(&self, unit: &UnitId, slot: usize, id: &str) -> bool {
        let mut inner = self.inner.write();
        let released = match inner.unit_mut(unit).and_then(|u| u.slots.get_mut(slot)) {
            Some(target) if target.as_deref() == Some(id) => {
                *target = None;
                true
            }
            _ => false,
        };
        if matches!(inner.locations.get(id), Some((u, s)) if u == unit && *s == slot) {
            inner.locations.remove(id);
        }
        released
    }

    /// Find the unit and slot an id is indexed under
    pub fn locate(&self, id: &str) -> Option<(UnitId, usize)> {
        self.inner.read().locations.get(id).cloned()
    }

    /// Tracked occupancy of a unit
    pub fn occupancy(&self, unit: &UnitId) -> Option<usize> {
        self.inner.read().unit(unit).map(UnitEntry::occupancy)
    }

    /// Ids indexed under a unit, in slot order
    pub fn record_ids(&self, unit: &UnitId) -> Option<Vec<String>> {
        self.inner.read().unit(unit).map(UnitEntry::record_ids)
    }

    /// Every indexed id
    pub fn all_record_ids(&self) -> Vec<String> {
        self.inner.read().locations.keys().cloned().collect()
    }

    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.inner
            .read()
            .units
            .iter()
            .map(|u| UnitSummary {
                id: u.handle.id.clone(),
                capacity: u.slots.len(),
                occupancy: u.occupancy(),
            })
            .collect()
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}
