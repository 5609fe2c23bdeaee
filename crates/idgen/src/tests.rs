use super::*;
use proptest::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn first_id_in_namespace_is_one() {
    let mut ids = IdAllocator::new();
    assert_eq!(ids.get_or_create("ns", "a").unwrap(), 1);
    assert_eq!(ids.get_or_create("ns", "b").unwrap(), 2);
    // other namespaces count independently
    assert_eq!(ids.get_or_create("other", "a").unwrap(), 1);
}

#[test]
fn existing_pair_keeps_its_id() {
    let mut ids = IdAllocator::new();
    let a = ids.get_or_create("ns", "a").unwrap();
    ids.get_or_create("ns", "b").unwrap();
    assert_eq!(ids.get_or_create("ns", "a").unwrap(), a);
    assert_eq!(ids.len(), 2);
}

#[test]
fn next_id_follows_the_maximum_not_the_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.toml");
    fs::write(&path, "[ns]\nlow = 1\nhigh = 40\n").unwrap();

    let mut ids = IdAllocator::load(&path).unwrap();
    assert_eq!(ids.get_or_create("ns", "fresh").unwrap(), 41);
}

#[test]
fn reserved_range_is_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.toml");
    fs::write(&path, "[ns]\nlast = 18999\n").unwrap();

    let mut ids = IdAllocator::load(&path).unwrap();
    assert_eq!(ids.get_or_create("ns", "next").unwrap(), 20_000);
}

#[test]
fn exhausted_namespace_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.toml");
    fs::write(&path, format!("[ns]\nlast = {MAX_FIELD_ID}\n")).unwrap();

    let mut ids = IdAllocator::load(&path).unwrap();
    let err = ids.get_or_create("ns", "one_more").unwrap_err();
    assert!(matches!(err, IdGenError::Exhausted(ns) if ns == "ns"));
}

#[test]
fn field_id_uses_table_namespace_and_signature() {
    let mut ids = IdAllocator::new();
    let id = ids.field_id("Items", "Items", "count", "int32").unwrap();
    assert_eq!(ids.get("TypeField#Items", "Items#count#int32"), Some(id));

    // retyping the column is a new name, hence a new id
    let retyped = ids.field_id("Items", "Items", "count", "int32_array").unwrap();
    assert_ne!(retyped, id);
}

#[test]
fn config_field_ids_live_in_their_own_namespace() {
    let mut ids = IdAllocator::new();
    ids.field_id("Items", "Items", "id", "int32").unwrap();
    assert_eq!(ids.config_field_id("Items").unwrap(), 1);
    assert_eq!(ids.namespace_count(), 2);
}

#[test]
fn missing_or_empty_file_loads_empty() {
    let dir = tempdir().unwrap();
    let missing = IdAllocator::load(&dir.path().join("nope.toml")).unwrap();
    assert!(missing.is_empty());

    let path = dir.path().join("empty.toml");
    fs::write(&path, "  \n").unwrap();
    assert!(IdAllocator::load(&path).unwrap().is_empty());
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.toml");
    fs::write(&path, "[ns\nbroken").unwrap();

    let err = IdAllocator::load(&path).unwrap_err();
    assert!(matches!(err, IdGenError::Parse { .. }));
}

#[test]
fn save_then_load_restores_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("proto_id.toml");

    let mut ids = IdAllocator::new();
    ids.field_id("Items", "Items", "id", "int32").unwrap();
    ids.field_id("Items", "Items", "name", "string").unwrap();
    ids.field_id("Shop", "Goods", "price", "float").unwrap();
    ids.save(&path).unwrap();

    assert!(!path.with_file_name("proto_id.toml.tmp").exists());
    let loaded = IdAllocator::load(&path).unwrap();
    assert_eq!(loaded, ids);
}

#[test]
fn save_overwrites_previous_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.toml");

    let mut ids = IdAllocator::new();
    ids.get_or_create("ns", "a").unwrap();
    ids.save(&path).unwrap();
    ids.get_or_create("ns", "b").unwrap();
    ids.save(&path).unwrap();

    let loaded = IdAllocator::load(&path).unwrap();
    assert_eq!(loaded.get("ns", "b"), Some(2));
}

proptest! {
    // Allocation order must not matter for ids already handed out, and
    // reloading from disk must never renumber anything.
    #[test]
    fn ids_are_stable_across_reload(names in prop::collection::vec("[a-z]{1,6}", 1..20)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.toml");

        let mut first = IdAllocator::new();
        let assigned: Vec<u32> = names
            .iter()
            .map(|n| first.get_or_create("ns", n).unwrap())
            .collect();
        first.save(&path).unwrap();

        let mut reloaded = IdAllocator::load(&path).unwrap();
        for (name, id) in names.iter().zip(&assigned) {
            prop_assert_eq!(reloaded.get_or_create("ns", name).unwrap(), *id);
        }

        let fresh = reloaded.get_or_create("ns", "ZZ_new").unwrap();
        prop_assert!(assigned.iter().all(|id| *id < fresh));
    }
}
