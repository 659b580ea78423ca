/// Tests for ResourceHandle
///
/// These tests validate slot index / generation decoding and the
/// stale-handle behavior of the underlying slot map.

use super::*;
use slotmap::SlotMap;

// ============================================================================
// Tests: Handle components
// ============================================================================

#[test]
fn test_default_handle_is_null() {
    let handle = ResourceHandle::default();
    assert!(handle.is_null());
}

#[test]
fn test_distinct_slots_for_live_entries() {
    let mut table: SlotMap<ResourceHandle, &str> = SlotMap::with_key();
    let a = table.insert("a");
    let b = table.insert("b");
    assert_ne!(a.slot_index(), b.slot_index());
    assert_eq!(a.generation(), b.generation());
}

// ============================================================================
// Tests: Slot recycling
// ============================================================================

#[test]
fn test_recycled_slot_gets_new_generation() {
    let mut table: SlotMap<ResourceHandle, &str> = SlotMap::with_key();
    let old = table.insert("old");
    table.remove(old);
    let new = table.insert("new");

    assert_eq!(old.slot_index(), new.slot_index());
    assert_ne!(old.generation(), new.generation());
    assert_ne!(old, new);
    assert!(table.get(old).is_none());
    assert_eq!(table.get(new), Some(&"new"));
}
