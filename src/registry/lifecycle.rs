//! Lifecycle handlers
//!
//! Host notifications arrive here one at a time. Scans suspend between
//! slot batches, so a unit may vanish mid-scan; every write to the index
//! re-checks that the unit is still registered.

use crate::context::StoreContext;
use crate::error::{Result, SlotError};
use crate::host::{Host, HostError, UnitHandle, UnitId};

use super::ScanReport;

/// Discover units persisted by earlier runs and mark the store ready
pub(crate) async fn on_host_ready<H: Host>(ctx: &StoreContext<H>) -> Result<Vec<ScanReport>> {
    if ctx.is_ready() {
        tracing::debug!("Ignoring repeated ready notification");
        return Ok(Vec::new());
    }

    let config = &ctx.config;
    let handles = ctx
        .host
        .query_units(&config.unit_kind, &config.rendezvous, config.discovery_radius)
        .await
        .map_err(|e| {
            tracing::error!("Unit discovery failed, store stays not ready: {}", e);
            SlotError::Host(e)
        })?;

    tracing::info!(
        store = %config.store_id,
        candidates = handles.len(),
        "Host ready, discovering units"
    );

    let mut reports = Vec::new();
    for handle in handles {
        if let Some(report) = on_unit_appeared(ctx, handle).await? {
            reports.push(report);
        }
    }

    ctx.mark_ready();
    tracing::info!(
        units = ctx.registry.unit_count(),
        items = ctx.cache.len(),
        "Store ready"
    );
    Ok(reports)
}

/// Register and scan a unit if it belongs to this store
///
/// Returns `None` for foreign, unusable or already-registered units.
pub(crate) async fn on_unit_appeared<H: Host>(
    ctx: &StoreContext<H>,
    handle: UnitHandle,
) -> Result<Option<ScanReport>> {
    if handle.kind != ctx.config.unit_kind {
        return Ok(None);
    }
    if ctx.registry.contains(&handle.id) {
        tracing::debug!(unit = %handle.id, "Duplicate appearance ignored");
        return Ok(None);
    }

    match ctx.host.owner_tag(&handle.id).await {
        Ok(Some(tag)) if tag == ctx.config.store_id => {}
        Ok(_) => return Ok(None),
        Err(e) => {
            tracing::warn!(unit = %handle.id, "Cannot read owner tag: {}", e);
            return Ok(None);
        }
    }

    let Some(capacity) = ctx.host.capacity(&handle.id).await else {
        tracing::warn!(unit = %handle.id, "Owned unit has no usable inventory, skipping");
        return Ok(None);
    };

    // The placement engine may have registered it while we were suspended
    if ctx.registry.contains(&handle.id) {
        return Ok(None);
    }

    scan_unit(ctx, handle, capacity).await.map(Some)
}

/// Forget a unit and every item it held
///
/// Returns the ids that were lost with it.
pub(crate) fn on_unit_vanished<H: Host>(ctx: &StoreContext<H>, unit: &UnitId) -> Vec<String> {
    let Some(ids) = ctx.registry.deregister(unit) else {
        tracing::debug!(unit = %unit, "Vanished unit was not registered");
        return Vec::new();
    };

    let lost = ctx.cache.remove_many(&ids);
    for id in &lost {
        tracing::warn!(unit = %unit, id = %id, "Item lost with vanished unit");
    }
    tracing::warn!(
        unit = %unit,
        lost = lost.len(),
        "{}",
        SlotError::UnitVanished(unit.clone())
    );
    lost
}

/// Register a unit and index every decodable item in its slots
///
/// Scanning an already-registered unit fails with `DuplicateUnit`.
pub(crate) async fn scan_unit<H: Host>(
    ctx: &StoreContext<H>,
    handle: UnitHandle,
    capacity: usize,
) -> Result<ScanReport> {
    let unit = handle.id.clone();
    ctx.registry.register(handle, capacity)?;

    let mut report = ScanReport::new(unit.clone(), capacity);
    let batch = ctx.config.scan_batch_size;

    for slot in 0..capacity {
        if slot > 0 && slot % batch == 0 {
            tokio::task::yield_now().await;
        }
        if !ctx.registry.contains(&unit) {
            report.aborted = true;
            break;
        }

        let item = match ctx.host.read_slot(&unit, slot).await {
            Ok(Some(item)) => item,
            Ok(None) => continue,
            Err(HostError::UnitNotFound(_)) => {
                report.aborted = true;
                break;
            }
            Err(e) => {
                tracing::warn!(unit = %unit, slot, "Slot read failed during scan: {}", e);
                continue;
            }
        };

        // Claimed by an in-flight placement after the scan started
        if !ctx.registry.is_slot_free(&unit, slot) {
            continue;
        }

        let Some(id) = ctx.codec.decode(&item) else {
            tracing::warn!("{}", SlotError::OrphanRecord { unit: unit.clone(), slot });
            report.orphans += 1;
            continue;
        };

        if ctx.registry.claim_slot(&unit, slot, &id) {
            ctx.cache.insert(id, ctx.codec.strip(item));
            report.indexed += 1;
        } else if ctx.registry.contains(&unit) {
            tracing::warn!(
                unit = %unit,
                slot,
                id = %id,
                "Id already indexed in another slot, treating as orphan"
            );
            report.duplicates += 1;
        } else {
            report.aborted = true;
            break;
        }
    }

    if report.aborted {
        tracing::warn!(unit = %unit, "Unit vanished during scan");
    } else {
        tracing::info!(
            unit = %unit,
            capacity,
            indexed = report.indexed,
            orphans = report.orphans,
            duplicates = report.duplicates,
            "Registered unit"
        );
    }
    Ok(report)
}
