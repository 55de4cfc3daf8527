//! Tests for Store
//!
//! These tests verify:
//! - Round trip, replace and remove semantics
//! - First-fit placement and unit creation on overflow
//! - Discovery of existing units and orphan handling
//! - Resilience to units vanishing
//! - Failure reporting when the host misbehaves
//! - Event loop processing through a subscription

use std::sync::Arc;
use std::time::Duration;

use slotkv::codec::{LabelCodec, PrefixLabelCodec};
use slotkv::host::{MemoryHostOptions, UnitId};
use slotkv::{Config, Host, HostEvent, Item, Location, MemoryHost, SlotError, Store};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .store_id("test-store")
        .spawn_ready_timeout_ms(500)
        .spawn_poll_interval_ms(5)
        .build()
}

fn setup_store(capacity: usize) -> (Arc<MemoryHost>, Store<MemoryHost>) {
    let host = Arc::new(MemoryHost::with_capacity(capacity));
    let store = Store::new(test_config(), Arc::clone(&host)).unwrap();
    (host, store)
}

async fn setup_ready_store(capacity: usize) -> (Arc<MemoryHost>, Store<MemoryHost>) {
    let (host, store) = setup_store(capacity);
    store.initialize().await.unwrap();
    (host, store)
}

/// Encode an item the way a previous run of the store would have
fn persisted(id: &str, content: &'static str) -> Option<Item> {
    let codec = PrefixLabelCodec::new(test_config().label_prefix);
    Some(codec.encode(Item::new(content), id).unwrap())
}

fn sorted_ids(store: &Store<MemoryHost>) -> Vec<String> {
    let mut ids = store.get_all_item_ids().unwrap();
    ids.sort();
    ids
}

fn strings(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

async fn setup_ready_store_with(options: MemoryHostOptions) -> (Arc<MemoryHost>, Store<MemoryHost>) {
    let host = Arc::new(MemoryHost::new(options));
    let store = Store::new(test_config(), Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();
    (host, store)
}

/// Cached ids and indexed ids must agree once no write is in flight
fn assert_cache_matches_index(store: &Store<MemoryHost>) {
    let mut indexed: Vec<String> = store
        .unit_ids()
        .iter()
        .flat_map(|unit| store.unit_items(unit).unwrap_or_default())
        .collect();
    indexed.sort();
    assert_eq!(sorted_ids(store), indexed);
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[tokio::test]
async fn test_set_get_round_trip() {
    let (_host, store) = setup_ready_store(9).await;
    let item = Item::new("diamond").with_label("Shiny");

    assert!(store.set_item(item.clone(), "a").await.unwrap());

    assert_eq!(store.get_item("a"), Some(item));
}

#[tokio::test]
async fn test_round_trip_without_label() {
    let (_host, store) = setup_ready_store(9).await;

    assert!(store.set_item(Item::new("stone"), "a").await.unwrap());

    assert_eq!(store.get_item("a"), Some(Item::new("stone")));
}

#[tokio::test]
async fn test_host_payload_carries_encoded_label() {
    let (host, store) = setup_ready_store(9).await;
    store
        .set_item(Item::new("diamond").with_label("Shiny"), "a")
        .await
        .unwrap();

    let (unit, slot) = store.locate("a").unwrap();
    let stored = host.slots(&unit).unwrap()[slot].clone().unwrap();
    let prefix = &store.config().label_prefix;

    assert_eq!(stored.label, Some(format!("{p}a{p}Shiny", p = prefix)));
}

#[tokio::test]
async fn test_get_returns_independent_copy() {
    let (_host, store) = setup_ready_store(9).await;
    store
        .set_item(Item::new("diamond").with_label("Shiny"), "a")
        .await
        .unwrap();

    let mut copy = store.get_item("a").unwrap();
    copy.label = Some("changed".to_string());

    assert_eq!(store.get_item("a").unwrap().label.as_deref(), Some("Shiny"));
}

#[tokio::test]
async fn test_get_nonexistent() {
    let (_host, store) = setup_ready_store(9).await;
    assert_eq!(store.get_item("missing"), None);
    assert!(!store.contains_item("missing"));
}

#[tokio::test]
async fn test_set_replaces_existing_id() {
    let (host, store) = setup_ready_store(9).await;

    store.set_item(Item::new("first"), "a").await.unwrap();
    store.set_item(Item::new("second"), "a").await.unwrap();

    assert_eq!(sorted_ids(&store), strings(&["a"]));
    assert_eq!(store.get_item("a"), Some(Item::new("second")));

    // Only one payload remains on the host
    let (unit, _) = store.locate("a").unwrap();
    let occupied = host.slots(&unit).unwrap().iter().flatten().count();
    assert_eq!(occupied, 1);
}

#[tokio::test]
async fn test_get_all_items() {
    let (_host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();
    store.set_item(Item::new("2").with_label("two"), "b").await.unwrap();

    let mut records = store.get_all_items().unwrap();
    records.sort_by(|x, y| x.id.cmp(&y.id));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].item, Item::new("1"));
    assert_eq!(records[1].item, Item::new("2").with_label("two"));
    assert_eq!(store.len(), 2);
}

// =============================================================================
// Remove Tests
// =============================================================================

#[tokio::test]
async fn test_remove_unknown_id() {
    let (_host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();

    assert!(!store.remove_item("zzz").await.unwrap());
    assert_eq!(sorted_ids(&store), strings(&["a"]));
}

#[tokio::test]
async fn test_remove_twice() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();
    let (unit, slot) = store.locate("a").unwrap();

    assert!(store.remove_item("a").await.unwrap());
    assert!(!store.remove_item("a").await.unwrap());

    assert!(store.get_all_item_ids().unwrap().is_empty());
    assert_eq!(host.slots(&unit).unwrap()[slot], None);
}

#[tokio::test]
async fn test_remove_after_unit_destroyed_silently() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();
    let (unit, _) = store.locate("a").unwrap();

    // Destroyed on the host, notification not yet delivered
    host.vanish(&unit);

    assert!(store.remove_item("a").await.unwrap());
    assert!(!store.contains_item("a"));
    assert_eq!(store.locate("a"), None);
}

#[tokio::test]
async fn test_remove_after_slot_emptied_externally() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();
    let (unit, slot) = store.locate("a").unwrap();

    host.write_slot(&unit, slot, None).await.unwrap();

    assert!(store.remove_item("a").await.unwrap());
    assert!(!store.contains_item("a"));
}

#[tokio::test]
async fn test_remove_detects_foreign_payload_in_slot() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();
    let (unit, slot) = store.locate("a").unwrap();

    host.tamper_label(&unit, slot, Some("renamed".to_string()));

    let result = store.remove_item("a").await;

    assert!(matches!(result, Err(SlotError::InconsistentSlot(_))));
    // Bookkeeping is still consistent afterwards
    assert!(!store.contains_item("a"));
    assert_eq!(store.locate("a"), None);
    // The foreign payload is left untouched
    assert!(host.slots(&unit).unwrap()[slot].is_some());
}

// =============================================================================
// Placement Tests
// =============================================================================

#[tokio::test]
async fn test_first_write_creates_unit() {
    let (host, store) = setup_ready_store(9).await;
    assert_eq!(host.unit_count(), 0);

    store.set_item(Item::new("1"), "a").await.unwrap();

    assert_eq!(host.unit_count(), 1);
    assert_eq!(store.unit_ids().len(), 1);
    let (unit, slot) = store.locate("a").unwrap();
    assert_eq!(slot, 0);
    assert_eq!(host.slots(&unit).unwrap().len(), 9);
}

#[tokio::test]
async fn test_new_unit_is_tagged_with_store_id() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("1"), "a").await.unwrap();

    let unit = store.unit_ids()[0].clone();
    let tag = host.owner_tag(&unit).await.unwrap();

    assert_eq!(tag.as_deref(), Some("test-store"));
}

#[tokio::test]
async fn test_fills_lowest_free_slot() {
    let (_host, store) = setup_ready_store(4).await;
    for id in ["a", "b", "c"] {
        store.set_item(Item::new(id), id).await.unwrap();
    }
    store.remove_item("b").await.unwrap();

    store.set_item(Item::new("d"), "d").await.unwrap();

    assert_eq!(store.locate("d").unwrap().1, 1);
}

#[tokio::test]
async fn test_capacity_overflow_creates_second_unit() {
    let capacity = 3;
    let (host, store) = setup_ready_store(capacity).await;

    for i in 0..=capacity {
        assert!(store.set_item(Item::new("x"), &format!("id{}", i)).await.unwrap());
    }

    let stats = store.stats();
    assert!(stats.units >= 2);
    assert_eq!(host.unit_count(), stats.units);
    assert_eq!(stats.items, capacity + 1);
    for unit in &stats.unit_details {
        assert!(unit.occupancy <= capacity);
    }
}

#[tokio::test]
async fn test_first_fit_prefers_earlier_unit() {
    let (_host, store) = setup_ready_store(2).await;
    for id in ["a", "b", "c"] {
        store.set_item(Item::new(id), id).await.unwrap();
    }
    let first = store.unit_ids()[0].clone();

    store.remove_item("a").await.unwrap();
    store.set_item(Item::new("d"), "d").await.unwrap();

    assert_eq!(store.locate("d"), Some((first, 0)));
    assert_eq!(store.unit_ids().len(), 2);
}

#[tokio::test]
async fn test_capacity_one_scenario() {
    let (_host, store) = setup_ready_store(1).await;

    assert!(store.set_item(Item::new("A"), "a").await.unwrap());
    assert_eq!(store.unit_ids().len(), 1);
    assert_eq!(store.stats().occupied_slots, 1);

    assert!(store.set_item(Item::new("B"), "b").await.unwrap());
    assert_eq!(store.unit_ids().len(), 2);

    assert_eq!(sorted_ids(&store), strings(&["a", "b"]));

    assert!(store.remove_item("a").await.unwrap());
    assert_eq!(sorted_ids(&store), strings(&["b"]));
}

#[tokio::test]
async fn test_concurrent_writes_each_get_a_slot() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        capacity: 1,
        ready_delay: Duration::from_millis(20),
        ..MemoryHostOptions::default()
    }));
    let store = Store::new(test_config(), Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();

    // Both calls suspend while their new units become ready
    let (a, b) = tokio::join!(
        store.set_item(Item::new("A"), "a"),
        store.set_item(Item::new("B"), "b")
    );

    assert!(a.unwrap());
    assert!(b.unwrap());
    assert_eq!(sorted_ids(&store), strings(&["a", "b"]));
    for unit in store.stats().unit_details {
        assert!(unit.occupancy <= 1);
    }
}

#[tokio::test]
async fn test_concurrent_sets_of_same_id_store_it_once() {
    let (host, store) = setup_ready_store_with(MemoryHostOptions {
        capacity: 1,
        ready_delay: Duration::from_millis(20),
        ..MemoryHostOptions::default()
    })
    .await;

    // Both calls miss the cache and spawn a unit for the same id
    let (a, b) = tokio::join!(
        store.set_item(Item::new("A"), "dup"),
        store.set_item(Item::new("B"), "dup")
    );

    let stored = [a.unwrap(), b.unwrap()];
    assert_eq!(stored.iter().filter(|s| **s).count(), 1);
    assert_eq!(sorted_ids(&store), strings(&["dup"]));
    // The losing call's unit does not linger on the host
    assert_eq!(host.unit_count(), 1);
    assert_eq!(store.unit_ids().len(), 1);
    assert_cache_matches_index(&store);
}

// =============================================================================
// Precondition Tests
// =============================================================================

#[tokio::test]
async fn test_operations_before_ready() {
    let (_host, store) = setup_store(9);

    assert!(!store.is_ready());
    assert!(matches!(
        store.set_item(Item::new("1"), "a").await,
        Err(SlotError::NotReady)
    ));
    assert!(matches!(store.get_all_item_ids(), Err(SlotError::NotReady)));
    assert!(matches!(store.get_all_items(), Err(SlotError::NotReady)));
}

#[tokio::test]
async fn test_clear_before_ready_forgets_only_registered_units() {
    let (host, store) = setup_store(4);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("a", "A")],
    );

    store.clear().await.unwrap();

    assert!(!store.is_ready());
    assert_eq!(host.unit_count(), 1);

    store.initialize().await.unwrap();
    assert_eq!(sorted_ids(&store), strings(&["a"]));
}

#[tokio::test]
async fn test_invalid_ids_rejected() {
    let (host, store) = setup_ready_store(9).await;
    let bad = format!("x{}y", store.config().label_prefix);

    assert!(matches!(
        store.set_item(Item::new("1"), "").await,
        Err(SlotError::InvalidId(_))
    ));
    assert!(matches!(
        store.set_item(Item::new("1"), &bad).await,
        Err(SlotError::InvalidId(_))
    ));
    assert_eq!(host.unit_count(), 0);
}

#[test]
fn test_store_rejects_invalid_config() {
    let host = Arc::new(MemoryHost::default());
    let config = Config::builder().store_id("").build();

    assert!(matches!(
        Store::new(config, host),
        Err(SlotError::Config(_))
    ));
}

// =============================================================================
// Host Failure Tests
// =============================================================================

#[tokio::test]
async fn test_refused_spawn_reports_false() {
    let (host, store) = setup_ready_store(9).await;
    host.set_refuse_spawn(true);

    assert!(!store.set_item(Item::new("1"), "a").await.unwrap());

    assert!(store.get_all_item_ids().unwrap().is_empty());
    assert_eq!(host.unit_count(), 0);
}

#[tokio::test]
async fn test_failed_write_reports_false() {
    let (host, store) = setup_ready_store(9).await;
    host.set_fail_writes(true);

    assert!(!store.set_item(Item::new("1"), "a").await.unwrap());

    assert!(!store.contains_item("a"));
    assert_eq!(store.locate("a"), None);
    // The unit spawned for the write is destroyed again
    assert_eq!(host.created_count(), 1);
    assert_eq!(host.unit_count(), 0);
    assert!(store.unit_ids().is_empty());

    // Works again once the host recovers
    host.set_fail_writes(false);
    assert!(store.set_item(Item::new("1"), "a").await.unwrap());
    assert!(store.contains_item("a"));
    assert_eq!(host.unit_count(), 1);
    assert_eq!(store.unit_ids().len(), 1);
}

#[tokio::test]
async fn test_repeated_failed_writes_do_not_accumulate_units() {
    let (host, store) = setup_ready_store(9).await;
    host.set_fail_writes(true);

    for i in 0..5 {
        assert!(!store.set_item(Item::new("x"), &format!("id{}", i)).await.unwrap());
    }

    assert_eq!(host.unit_count(), 0);
    assert!(store.unit_ids().is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_write_into_unit_with_room_creates_no_unit() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    host.set_fail_writes(true);

    assert!(!store.set_item(Item::new("B"), "b").await.unwrap());

    assert_eq!(host.created_count(), 1);
    assert_eq!(host.unit_count(), 1);
    assert_eq!(store.unit_ids().len(), 1);
    assert_eq!(store.stats().occupied_slots, 1);
    assert_cache_matches_index(&store);
}

#[tokio::test]
async fn test_unit_never_ready_is_discarded() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        capacity: 9,
        ready_delay: Duration::from_secs(60),
        ..MemoryHostOptions::default()
    }));
    let config = Config::builder()
        .store_id("test-store")
        .spawn_ready_timeout_ms(30)
        .spawn_poll_interval_ms(5)
        .build();
    let store = Store::new(config, Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();

    assert!(!store.set_item(Item::new("1"), "a").await.unwrap());

    assert_eq!(host.created_count(), 1);
    assert_eq!(host.unit_count(), 0);
    assert!(store.unit_ids().is_empty());
}

#[tokio::test]
async fn test_failed_replace_drops_old_item() {
    let (host, store) = setup_ready_store(9).await;
    store.set_item(Item::new("old"), "a").await.unwrap();

    host.set_fail_writes(true);
    let stored = store.set_item(Item::new("new"), "a").await.unwrap();

    assert!(!stored);
    assert_eq!(store.get_item("a"), None);
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[tokio::test]
async fn test_ready_discovers_owned_units() {
    let (host, store) = setup_store(4);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("a", "A"), None, persisted("b", "B")],
    );

    let reports = store.initialize().await.unwrap();

    assert!(store.is_ready());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].indexed, 2);
    assert_eq!(sorted_ids(&store), strings(&["a", "b"]));
    assert_eq!(store.get_item("b"), Some(Item::new("B")));
}

#[tokio::test]
async fn test_ready_ignores_foreign_and_distant_units() {
    let (host, store) = setup_store(4);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("other-store"),
        vec![persisted("x", "X")],
    );
    host.seed_unit(
        &config.unit_kind,
        Location::new(1000.0, 0.0, 0.0),
        Some("test-store"),
        vec![persisted("y", "Y")],
    );
    host.seed_unit("barrel", config.rendezvous, Some("test-store"), vec![persisted("z", "Z")]);

    store.initialize().await.unwrap();

    assert!(store.get_all_item_ids().unwrap().is_empty());
    assert!(store.unit_ids().is_empty());
}

#[tokio::test]
async fn test_scan_skips_orphans() {
    let (host, store) = setup_store(4);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![
            Some(Item::new("no label")),
            persisted("a", "A"),
            Some(Item::new("renamed").with_label("Bob's Pick")),
        ],
    );

    let reports = store.initialize().await.unwrap();

    assert_eq!(reports[0].orphans, 2);
    assert_eq!(reports[0].indexed, 1);
    assert_eq!(sorted_ids(&store), strings(&["a"]));
}

#[tokio::test]
async fn test_placement_skips_slots_held_by_orphans() {
    let (host, store) = setup_store(3);
    let config = test_config();
    let unit = host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![Some(Item::new("orphan"))],
    );
    store.initialize().await.unwrap();

    store.set_item(Item::new("A"), "a").await.unwrap();

    assert_eq!(store.locate("a"), Some((unit.clone(), 1)));
    assert_eq!(host.slots(&unit).unwrap()[0], Some(Item::new("orphan")));
}

#[tokio::test]
async fn test_duplicate_ids_across_units_indexed_once() {
    let (host, store) = setup_store(2);
    let config = test_config();
    for _ in 0..2 {
        host.seed_unit(
            &config.unit_kind,
            config.rendezvous,
            Some("test-store"),
            vec![persisted("dup", "D")],
        );
    }

    let reports = store.initialize().await.unwrap();

    let duplicates: usize = reports.iter().map(|r| r.duplicates).sum();
    assert_eq!(duplicates, 1);
    assert_eq!(sorted_ids(&store), strings(&["dup"]));
}

#[tokio::test]
async fn test_small_scan_batches_cover_every_slot() {
    let host = Arc::new(MemoryHost::with_capacity(10));
    let config = Config::builder().store_id("test-store").scan_batch_size(3).build();
    let seeded: Vec<Option<Item>> = (0..10)
        .map(|i| {
            let codec = PrefixLabelCodec::new(config.label_prefix.clone());
            Some(codec.encode(Item::new(format!("v{}", i)), &format!("id{}", i)).unwrap())
        })
        .collect();
    host.seed_unit(&config.unit_kind, config.rendezvous, Some("test-store"), seeded);

    let store = Store::new(config, Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();

    assert_eq!(store.len(), 10);
}

#[tokio::test]
async fn test_repeated_ready_is_ignored() {
    let (host, store) = setup_store(4);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("a", "A")],
    );

    store.handle_event(HostEvent::Ready).await.unwrap();
    store.handle_event(HostEvent::Ready).await.unwrap();

    assert_eq!(store.unit_ids().len(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_unit_appearing_after_ready_is_scanned_once() {
    let (host, store) = setup_ready_store(4).await;
    let config = test_config();
    let unit = host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("late", "L")],
    );
    let handle = host
        .query_units(&config.unit_kind, &config.rendezvous, 1.0)
        .await
        .unwrap()
        .into_iter()
        .find(|h| h.id == unit)
        .unwrap();

    store
        .handle_event(HostEvent::UnitAppeared(handle.clone()))
        .await
        .unwrap();
    store
        .handle_event(HostEvent::UnitAppeared(handle))
        .await
        .unwrap();

    assert_eq!(store.unit_ids(), vec![unit]);
    assert_eq!(sorted_ids(&store), strings(&["late"]));
}

// =============================================================================
// Vanish Tests
// =============================================================================

#[tokio::test]
async fn test_vanish_removes_only_that_units_ids() {
    let (_host, store) = setup_ready_store(2).await;
    for id in ["a", "b", "c"] {
        store.set_item(Item::new(id), id).await.unwrap();
    }
    let first = store.unit_ids()[0].clone();
    let lost = store.unit_items(&first).unwrap();
    assert_eq!(lost, strings(&["a", "b"]));

    store
        .handle_event(HostEvent::UnitVanished(first))
        .await
        .unwrap();

    assert_eq!(sorted_ids(&store), strings(&["c"]));
    assert_eq!(store.unit_ids().len(), 1);
}

#[tokio::test]
async fn test_vanish_of_unknown_unit_is_harmless() {
    let (_host, store) = setup_ready_store(2).await;
    store.set_item(Item::new("A"), "a").await.unwrap();

    store
        .handle_event(HostEvent::UnitVanished(UnitId::new("not-ours")))
        .await
        .unwrap();

    assert_eq!(sorted_ids(&store), strings(&["a"]));
}

#[tokio::test]
async fn test_write_after_vanish_uses_fresh_unit() {
    let (host, store) = setup_ready_store(2).await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    let first = store.unit_ids()[0].clone();

    host.vanish(&first);
    store
        .handle_event(HostEvent::UnitVanished(first.clone()))
        .await
        .unwrap();
    store.set_item(Item::new("B"), "b").await.unwrap();

    let (unit, slot) = store.locate("b").unwrap();
    assert_ne!(unit, first);
    assert_eq!(slot, 0);
}

#[tokio::test]
async fn test_unit_vanishing_while_spawning_fails_cleanly() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        capacity: 4,
        ready_delay: Duration::from_millis(50),
        ..MemoryHostOptions::default()
    }));
    let config = Config::builder()
        .store_id("test-store")
        .spawn_ready_timeout_ms(150)
        .spawn_poll_interval_ms(5)
        .build();
    let store = Store::new(config, Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();

    let (stored, ()) = tokio::join!(store.set_item(Item::new("A"), "a"), async {
        while host.created_count() == 0 {
            tokio::task::yield_now().await;
        }
        let unit = host.unit_ids()[0].clone();
        host.vanish(&unit);
        store
            .handle_event(HostEvent::UnitVanished(unit))
            .await
            .unwrap();
    });

    assert!(!stored.unwrap());
    assert_eq!(host.unit_count(), 0);
    assert!(store.unit_ids().is_empty());
    assert!(!store.contains_item("a"));
    assert_cache_matches_index(&store);
}

#[tokio::test]
async fn test_unit_vanishing_during_write_fails_cleanly() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        capacity: 4,
        io_delay: Duration::from_millis(10),
        ..MemoryHostOptions::default()
    }));
    let config = test_config();
    let unit = host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("a", "A")],
    );
    let store = Store::new(config, Arc::clone(&host)).unwrap();
    store.initialize().await.unwrap();

    let (stored, ()) = tokio::join!(store.set_item(Item::new("B"), "b"), async {
        // The claim shows up once the write is in flight
        while store.locate("b").is_none() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        host.vanish(&unit);
        store
            .handle_event(HostEvent::UnitVanished(unit.clone()))
            .await
            .unwrap();
    });

    assert!(!stored.unwrap());
    assert_eq!(host.created_count(), 0);
    assert!(store.unit_ids().is_empty());
    assert!(store.get_all_item_ids().unwrap().is_empty());
    assert_cache_matches_index(&store);
}

#[tokio::test]
async fn test_unit_vanishing_mid_scan_aborts_scan() {
    let host = Arc::new(MemoryHost::with_capacity(4));
    let config = Config::builder().store_id("test-store").scan_batch_size(1).build();
    let unit = host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![
            persisted("a", "A"),
            persisted("b", "B"),
            persisted("c", "C"),
            persisted("d", "D"),
        ],
    );
    let store = Store::new(config, Arc::clone(&host)).unwrap();

    let (reports, ()) = tokio::join!(store.initialize(), async {
        while store.unit_ids().is_empty() {
            tokio::task::yield_now().await;
        }
        host.vanish(&unit);
        store
            .handle_event(HostEvent::UnitVanished(unit.clone()))
            .await
            .unwrap();
    });

    let reports = reports.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].aborted);
    assert!(reports[0].indexed < 4);
    assert!(store.is_ready());
    assert!(store.unit_ids().is_empty());
    assert!(store.get_all_item_ids().unwrap().is_empty());
    assert_cache_matches_index(&store);
}

#[tokio::test]
async fn test_remove_while_unit_vanishes_drops_bookkeeping() {
    let (host, store) = setup_ready_store_with(MemoryHostOptions {
        capacity: 4,
        io_delay: Duration::from_millis(10),
        ..MemoryHostOptions::default()
    })
    .await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    store.set_item(Item::new("B"), "b").await.unwrap();
    let (unit, _) = store.locate("a").unwrap();

    let (removed, ()) = tokio::join!(store.remove_item("a"), async {
        // Past the slot check, before the clear lands
        tokio::time::sleep(Duration::from_millis(15)).await;
        host.vanish(&unit);
        store
            .handle_event(HostEvent::UnitVanished(unit.clone()))
            .await
            .unwrap();
    });

    assert!(removed.unwrap());
    assert!(!store.contains_item("a"));
    assert!(!store.contains_item("b"));
    assert_eq!(store.locate("a"), None);
    assert!(store.unit_ids().is_empty());
    assert_cache_matches_index(&store);
}

// =============================================================================
// Clear Tests
// =============================================================================

#[tokio::test]
async fn test_clear_destroys_units_and_empties_store() {
    let (host, store) = setup_ready_store(2).await;
    for id in ["a", "b", "c"] {
        store.set_item(Item::new(id), id).await.unwrap();
    }

    store.clear().await.unwrap();

    assert!(store.get_all_items().unwrap().is_empty());
    assert!(store.unit_ids().is_empty());
    assert_eq!(host.unit_count(), 0);
}

#[tokio::test]
async fn test_set_after_clear_creates_fresh_unit() {
    let (host, store) = setup_ready_store(2).await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    let old_unit = store.unit_ids()[0].clone();

    store.clear().await.unwrap();
    assert!(store.set_item(Item::new("B"), "b").await.unwrap());

    assert_eq!(host.created_count(), 2);
    assert_eq!(store.unit_ids().len(), 1);
    assert_ne!(store.unit_ids()[0], old_unit);
    assert_eq!(sorted_ids(&store), strings(&["b"]));
}

#[tokio::test]
async fn test_clear_tolerates_already_destroyed_units() {
    let (host, store) = setup_ready_store(1).await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    store.set_item(Item::new("B"), "b").await.unwrap();

    // One unit disappears without the store hearing about it
    host.vanish(&store.unit_ids()[0]);

    store.clear().await.unwrap();

    assert!(store.is_empty());
    assert_eq!(host.unit_count(), 0);
}

// =============================================================================
// Event Loop Tests
// =============================================================================

#[tokio::test]
async fn test_run_processes_host_events() {
    let (host, store) = setup_store(2);
    let config = test_config();
    host.seed_unit(
        &config.unit_kind,
        config.rendezvous,
        Some("test-store"),
        vec![persisted("a", "A"), persisted("b", "B")],
    );

    let subscription = host.bus().subscribe();
    host.announce_ready();

    // The loop only ends with the bus; bound it instead
    let _ = tokio::time::timeout(Duration::from_millis(50), store.run(subscription)).await;

    assert!(store.is_ready());
    assert_eq!(sorted_ids(&store), strings(&["a", "b"]));
    // Dropping the loop dropped its subscription
    assert_eq!(host.bus().subscriber_count(), 0);
}

#[tokio::test]
async fn test_run_handles_external_destroy() {
    let (host, store) = setup_ready_store(1).await;
    store.set_item(Item::new("A"), "a").await.unwrap();
    store.set_item(Item::new("B"), "b").await.unwrap();
    let (unit_a, _) = store.locate("a").unwrap();

    let subscription = host.bus().subscribe();
    host.vanish(&unit_a);
    let _ = tokio::time::timeout(Duration::from_millis(50), store.run(subscription)).await;

    assert_eq!(sorted_ids(&store), strings(&["b"]));
}

#[tokio::test]
async fn test_own_unit_creation_events_are_harmless() {
    let (host, store) = setup_ready_store(1).await;
    let subscription = host.bus().subscribe();

    store.set_item(Item::new("A"), "a").await.unwrap();
    store.set_item(Item::new("B"), "b").await.unwrap();

    // Appearance notifications for units the store created itself
    let _ = tokio::time::timeout(Duration::from_millis(50), store.run(subscription)).await;

    assert_eq!(store.unit_ids().len(), 2);
    assert_eq!(sorted_ids(&store), strings(&["a", "b"]));
}
