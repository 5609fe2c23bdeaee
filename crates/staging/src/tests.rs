use super::*;

// -------------------- Insert / lookup --------------------

#[test]
fn insert_and_get_single_key() {
    let mut t = StagingTable::new("t");
    assert!(t.insert(b"1".to_vec(), b"v1".to_vec()));
    assert_eq!(t.len(), 1);
    assert_eq!(t.get(b"1"), Some(&b"v1"[..]));
    assert!(t.contains_key(b"1"));
}

#[test]
fn duplicate_key_is_refused() {
    let mut t = StagingTable::new("t");
    assert!(t.insert(b"k".to_vec(), b"first".to_vec()));
    assert!(!t.insert(b"k".to_vec(), b"second".to_vec()));
    assert_eq!(t.get(b"k"), Some(&b"first"[..]));
    assert_eq!(t.len(), 1);
}

#[test]
fn get_missing_key_returns_none() {
    let t = StagingTable::default();
    assert!(t.get(b"nonexistent").is_none());
    assert!(t.is_empty());
}

// -------------------- Ordering / sizing --------------------

#[test]
fn iter_is_sorted_by_key() {
    let mut t = StagingTable::new("t");
    for k in ["30", "1", "200", "7"] {
        t.insert(k.as_bytes().to_vec(), Vec::new());
    }
    let keys: Vec<&[u8]> = t.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![&b"1"[..], &b"200"[..], &b"30"[..], &b"7"[..]]);
}

#[test]
fn approx_size_counts_keys_and_values() {
    let mut t = StagingTable::new("t");
    assert_eq!(t.approx_size(), 0);
    t.insert(b"a".to_vec(), b"aaa".to_vec());
    assert_eq!(t.approx_size(), 4);
    // refused insert does not count
    t.insert(b"a".to_vec(), b"bbbbbb".to_vec());
    assert_eq!(t.approx_size(), 4);
    t.clear();
    assert_eq!(t.approx_size(), 0);
    assert!(t.is_empty());
}

#[test]
fn write_load_10k_unique_keys() {
    let mut t = StagingTable::new("load");
    for i in 0..10_000u32 {
        assert!(t.insert(format!("{i:05}").into_bytes(), i.to_le_bytes().to_vec()));
    }
    assert_eq!(t.len(), 10_000);
    assert_eq!(t.get(b"04242"), Some(&4242u32.to_le_bytes()[..]));
}

// -------------------- Labels --------------------

#[test]
fn sheet_labels_are_unique_per_table() {
    let a = StagingTable::for_sheet("Items", "Items");
    let b = StagingTable::for_sheet("Items", "Items");
    assert_ne!(a.label(), b.label());
    assert!(a.label().starts_with("Items_Items."));
}
