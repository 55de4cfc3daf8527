//! In-memory host
//!
//! A self-contained simulation of the host environment. Units live in a
//! map, lifecycle notifications go out through an `EventBus`, and a few
//! switches inject the failures a real host produces (refused spawns,
//! failed writes, slow readiness, slow slot access, external deletion).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    EventBus, Host, HostError, HostEvent, HostResult, Item, Location, UnitHandle, UnitId,
};

/// Tunables for the simulated host
#[derive(Debug, Clone)]
pub struct MemoryHostOptions {
    /// Slots per created unit
    pub capacity: usize,

    /// Delay between `create_unit` and the unit reporting a capacity
    pub ready_delay: Duration,

    /// Latency of each slot read and write
    pub io_delay: Duration,
}

impl Default for MemoryHostOptions {
    fn default() -> Self {
        Self {
            capacity: 27,
            ready_delay: Duration::ZERO,
            io_delay: Duration::ZERO,
        }
    }
}

struct SimUnit {
    handle: UnitHandle,
    slots: Vec<Option<Item>>,
    owner_tag: Option<String>,
    ready_at: Instant,
}

/// Host simulation backed by process memory
pub struct MemoryHost {
    options: MemoryHostOptions,
    units: Mutex<BTreeMap<UnitId, SimUnit>>,
    bus: EventBus,
    next_unit_id: AtomicU64,
    created: AtomicU64,
    refuse_spawn: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryHost {
    pub fn new(options: MemoryHostOptions) -> Self {
        Self {
            options,
            units: Mutex::new(BTreeMap::new()),
            bus: EventBus::new(),
            next_unit_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            refuse_spawn: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Host with units of the given capacity that are ready immediately
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(MemoryHostOptions {
            capacity,
            ..MemoryHostOptions::default()
        })
    }

    /// The event bus this host publishes lifecycle notifications on
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Make `create_unit` fail
    pub fn set_refuse_spawn(&self, refuse: bool) {
        self.refuse_spawn.store(refuse, Ordering::SeqCst);
    }

    /// Make every `write_slot` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Destroy a unit from outside the store (publishes `UnitVanished`)
    pub fn vanish(&self, unit: &UnitId) -> bool {
        let removed = self.units.lock().remove(unit).is_some();
        if removed {
            self.bus.publish(HostEvent::UnitVanished(unit.clone()));
        }
        removed
    }

    /// Overwrite the label of whatever occupies a slot, bypassing the store
    pub fn tamper_label(&self, unit: &UnitId, slot: usize, label: Option<String>) -> bool {
        let mut units = self.units.lock();
        match units
            .get_mut(unit)
            .and_then(|u| u.slots.get_mut(slot))
            .and_then(|s| s.as_mut())
        {
            Some(item) => {
                item.label = label;
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // World Setup
    // =========================================================================

    /// Place a pre-existing unit without publishing any event, as if it had
    /// been persisted by an earlier run
    pub fn seed_unit(
        &self,
        kind: &str,
        location: Location,
        owner_tag: Option<&str>,
        items: Vec<Option<Item>>,
    ) -> UnitId {
        let id = self.allocate_id();
        let mut slots = items;
        slots.resize(self.options.capacity.max(slots.len()), None);

        let unit = SimUnit {
            handle: UnitHandle {
                id: id.clone(),
                kind: kind.to_string(),
                location,
            },
            slots,
            owner_tag: owner_tag.map(str::to_string),
            ready_at: Instant::now(),
        };
        self.units.lock().insert(id.clone(), unit);
        id
    }

    /// Publish `UnitAppeared` for an existing unit, as when it is loaded
    pub fn announce(&self, unit: &UnitId) -> bool {
        let handle = self.units.lock().get(unit).map(|u| u.handle.clone());
        match handle {
            Some(handle) => {
                self.bus.publish(HostEvent::UnitAppeared(handle));
                true
            }
            None => false,
        }
    }

    /// Publish the one-time `Ready` notification
    pub fn announce_ready(&self) {
        self.bus.publish(HostEvent::Ready);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.lock().keys().cloned().collect()
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().len()
    }

    /// Number of units ever created through `create_unit`
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Snapshot of a unit's slots
    pub fn slots(&self, unit: &UnitId) -> Option<Vec<Option<Item>>> {
        self.units.lock().get(unit).map(|u| u.slots.clone())
    }

    async fn io_pause(&self) {
        if !self.options.io_delay.is_zero() {
            tokio::time::sleep(self.options.io_delay).await;
        }
    }

    fn allocate_id(&self) -> UnitId {
        let n = self.next_unit_id.fetch_add(1, Ordering::SeqCst);
        UnitId(format!("unit-{:04}", n))
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(MemoryHostOptions::default())
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn create_unit(&self, location: &Location, kind: &str) -> HostResult<UnitHandle> {
        if self.refuse_spawn.load(Ordering::SeqCst) {
            return Err(HostError::Rejected(format!("cannot spawn {} here", kind)));
        }

        let id = self.allocate_id();
        let handle = UnitHandle {
            id: id.clone(),
            kind: kind.to_string(),
            location: *location,
        };
        let unit = SimUnit {
            handle: handle.clone(),
            slots: vec![None; self.options.capacity],
            owner_tag: None,
            ready_at: Instant::now() + self.options.ready_delay,
        };
        self.units.lock().insert(id, unit);
        self.created.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(HostEvent::UnitAppeared(handle.clone()));

        Ok(handle)
    }

    async fn destroy_unit(&self, unit: &UnitId) -> HostResult<()> {
        if self.vanish(unit) {
            Ok(())
        } else {
            Err(HostError::UnitNotFound(unit.clone()))
        }
    }

    async fn query_units(
        &self,
        kind: &str,
        location: &Location,
        radius: f64,
    ) -> HostResult<Vec<UnitHandle>> {
        let units = self.units.lock();
        Ok(units
            .values()
            .filter(|u| u.handle.kind == kind && u.handle.location.distance(location) <= radius)
            .map(|u| u.handle.clone())
            .collect())
    }

    async fn capacity(&self, unit: &UnitId) -> Option<usize> {
        let units = self.units.lock();
        let unit = units.get(unit)?;
        if Instant::now() < unit.ready_at || unit.slots.is_empty() {
            return None;
        }
        Some(unit.slots.len())
    }

    async fn read_slot(&self, unit: &UnitId, slot: usize) -> HostResult<Option<Item>> {
        self.io_pause().await;
        let units = self.units.lock();
        let sim = units
            .get(unit)
            .ok_or_else(|| HostError::UnitNotFound(unit.clone()))?;
        sim.slots
            .get(slot)
            .cloned()
            .ok_or_else(|| HostError::SlotOutOfRange {
                unit: unit.clone(),
                slot,
            })
    }

    async fn write_slot(&self, unit: &UnitId, slot: usize, item: Option<Item>) -> HostResult<()> {
        self.io_pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("writes disabled".to_string()));
        }

        let mut units = self.units.lock();
        let sim = units
            .get_mut(unit)
            .ok_or_else(|| HostError::UnitNotFound(unit.clone()))?;
        let target = sim
            .slots
            .get_mut(slot)
            .ok_or_else(|| HostError::SlotOutOfRange {
                unit: unit.clone(),
                slot,
            })?;
        *target = item;
        Ok(())
    }

    async fn owner_tag(&self, unit: &UnitId) -> HostResult<Option<String>> {
        let units = self.units.lock();
        units
            .get(unit)
            .map(|u| u.owner_tag.clone())
            .ok_or_else(|| HostError::UnitNotFound(unit.clone()))
    }

    async fn set_owner_tag(&self, unit: &UnitId, tag: &str) -> HostResult<()> {
        let mut units = self.units.lock();
        let sim = units
            .get_mut(unit)
            .ok_or_else(|| HostError::UnitNotFound(unit.clone()))?;
        sim.owner_tag = Some(tag.to_string());
        Ok(())
    }
}
