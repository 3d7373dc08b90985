// Write-ahead log tests: exclusive create, ordered appends, sealing,
// and restart recovery.

use std::io::Write;

use silt::record::Record;
use silt::wal::{SyncPolicy, Wal};

// =============================================================================
// Test 1: Create is exclusive — second create on the same path fails
// =============================================================================
#[test]
fn create_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1000.wal");

    let _wal = Wal::create(&path, SyncPolicy::EveryWrite).unwrap();

    match Wal::create(&path, SyncPolicy::EveryWrite) {
        Err(silt::Error::AlreadyExists(p)) => assert_eq!(p, path),
        Err(other) => panic!("expected AlreadyExists, got {other:?}"),
        Ok(_) => panic!("second create on an occupied path must fail"),
    }
}

// =============================================================================
// Test 2: Sealing returns records in append order
// =============================================================================
#[test]
fn seal_returns_records_in_append_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::create(dir.path().join("1.wal"), SyncPolicy::EveryWrite).unwrap();

    wal.append(&Record::new("b", "2").unwrap()).unwrap();
    wal.append(&Record::new("a", "1").unwrap()).unwrap();
    wal.append(&Record::tombstone("b").unwrap()).unwrap();
    wal.append(&Record::new("a", "updated").unwrap()).unwrap();

    let entries = wal.close_and_get_entries().unwrap();
    assert_eq!(entries.len(), 4);

    // append order, not key order, and duplicates are preserved
    assert_eq!(entries[0].key(), "b");
    assert_eq!(entries[0].value(), Some("2"));
    assert_eq!(entries[1].key(), "a");
    assert!(entries[2].is_tombstone());
    assert_eq!(entries[2].key(), "b");
    assert_eq!(entries[3].value(), Some("updated"));
}

// =============================================================================
// Test 3: Offsets track serialized sizes
// =============================================================================
#[test]
fn offset_tracks_bytes_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::create(dir.path().join("1.wal"), SyncPolicy::EveryWrite).unwrap();
    assert_eq!(wal.size_bytes(), 0);
    assert_eq!(wal.count(), 0);

    let record = Record::new("key", "value").unwrap();
    let expected = record.encoded_len();

    wal.append(&record).unwrap();
    assert_eq!(wal.size_bytes(), expected);
    assert_eq!(wal.count(), 1);

    wal.append(&record).unwrap();
    assert_eq!(wal.size_bytes(), expected * 2);
    assert_eq!(wal.count(), 2);
}

// =============================================================================
// Test 4: Restart recovery — restore rebuilds the exact record sequence
// =============================================================================
#[test]
fn restore_rebuilds_the_same_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("7.wal");

    let written: Vec<Record> = (0..20)
        .map(|i| Record::new(format!("key_{i:02}"), format!("val_{i}")).unwrap())
        .collect();

    {
        let mut wal = Wal::create(&path, SyncPolicy::EveryWrite).unwrap();
        for record in &written {
            wal.append(record).unwrap();
        }
        // dropped here: simulated process exit
    }

    let restored = Wal::restore(&path, SyncPolicy::EveryWrite).unwrap();
    assert_eq!(restored.count(), 20);

    let entries = restored.close_and_get_entries().unwrap();
    assert_eq!(entries, written);
}

// =============================================================================
// Test 5: Restore accepts further appends after the recovered tail
// =============================================================================
#[test]
fn restore_then_append_continues_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("9.wal");

    {
        let mut wal = Wal::create(&path, SyncPolicy::EveryWrite).unwrap();
        wal.append(&Record::new("before", "restart").unwrap()).unwrap();
    }

    let mut wal = Wal::restore(&path, SyncPolicy::EveryWrite).unwrap();
    wal.append(&Record::new("after", "restart").unwrap()).unwrap();

    let entries = wal.close_and_get_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key(), "before");
    assert_eq!(entries[1].key(), "after");
}

// =============================================================================
// Test 6: A torn trailing record makes restore fail hard
// =============================================================================
#[test]
fn restore_rejects_truncated_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("3.wal");

    {
        let mut wal = Wal::create(&path, SyncPolicy::EveryWrite).unwrap();
        wal.append(&Record::new("ok", "1").unwrap()).unwrap();
    }
    // simulate a crash mid-write: valid record followed by a torn line
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"half|123").unwrap();
    drop(file);

    match Wal::restore(&path, SyncPolicy::EveryWrite) {
        Err(silt::Error::MalformedRecord(_)) => {}
        Err(other) => panic!("expected MalformedRecord, got {other:?}"),
        Ok(_) => panic!("restore of a torn log must fail"),
    }
}

// =============================================================================
// Test 7: A garbage line makes restore fail hard
// =============================================================================
#[test]
fn restore_rejects_unparsable_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("4.wal");
    std::fs::write(&path, "key|notatimestamp|value\n").unwrap();

    assert!(matches!(
        Wal::restore(&path, SyncPolicy::EveryWrite),
        Err(silt::Error::MalformedRecord(_))
    ));
}

// =============================================================================
// Test 8: Batched sync policy still keeps every record readable
// =============================================================================
#[test]
fn batched_sync_policy_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut wal = Wal::create(dir.path().join("5.wal"), SyncPolicy::EveryNWrites(4)).unwrap();

    for i in 0..10 {
        wal.append(&Record::new(format!("k{i}"), "v").unwrap()).unwrap();
    }
    wal.sync().unwrap();

    let entries = wal.close_and_get_entries().unwrap();
    assert_eq!(entries.len(), 10);
}

// =============================================================================
// Test 9: An empty log seals into an empty sequence
// =============================================================================
#[test]
fn empty_log_seals_empty() {
    let dir = tempfile::tempdir().unwrap();
    let wal = Wal::create(dir.path().join("6.wal"), SyncPolicy::Never).unwrap();
    assert!(wal.close_and_get_entries().unwrap().is_empty());
}
