// Engine tests: read/write path, write-through cache, log rotation into
// level 0, leftover-log recovery, and shared-access behavior.

use std::sync::Arc;
use std::thread;

use silt::{DB, Options, SyncPolicy};

fn options(root: &std::path::Path) -> Options {
    Options::new(root.join("wal"), root.join("lsm"))
}

// =============================================================================
// Test 1: Insert then get
// =============================================================================
#[test]
fn insert_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    db.insert("fruit", "apple").unwrap();
    assert_eq!(db.get("fruit").unwrap().as_deref(), Some("apple"));
    assert_eq!(db.get("vegetable").unwrap(), None);

    db.insert("fruit", "pear").unwrap();
    assert_eq!(db.get("fruit").unwrap().as_deref(), Some("pear"));
}

// =============================================================================
// Test 2: Write-through delete — the tombstone is visible immediately
// =============================================================================
#[test]
fn delete_hides_key_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    db.insert("x", "1").unwrap();
    db.delete("x").unwrap();

    // no merge has happened; the cache alone must reflect the tombstone
    assert_eq!(db.get("x").unwrap(), None);
    assert_eq!(db.stats().tables_per_level, vec![0; 5]);
}

// =============================================================================
// Test 3: An empty value is a value, not a deletion
// =============================================================================
#[test]
fn empty_value_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    db.insert("blank", "").unwrap();
    assert_eq!(db.get("blank").unwrap().as_deref(), Some(""));
}

// =============================================================================
// Test 4: Bad keys are rejected before anything touches disk
// =============================================================================
#[test]
fn invalid_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    assert!(matches!(db.insert("", "v"), Err(silt::Error::InvalidKey(_))));
    assert!(matches!(
        db.insert("a|b", "v"),
        Err(silt::Error::InvalidKey(_))
    ));
    assert!(matches!(db.delete("a|b"), Err(silt::Error::InvalidKey(_))));
    assert_eq!(db.stats().wal_records, 0);
}

// =============================================================================
// Test 5: Reaching the rotation threshold flushes into level 0
// =============================================================================
#[test]
fn rotation_flushes_into_level_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.wal_rotate_bytes = 256; // rotate after a handful of records

    let db = DB::open(opts).unwrap();
    for i in 0..50 {
        db.insert(format!("key_{i:02}"), format!("value_{i}")).unwrap();
    }

    let stats = db.stats();
    assert!(
        stats.tables_per_level[0] > 0,
        "expected level-0 tables, got {stats:?}"
    );
    // the active log was swapped at least once and is nowhere near 50 records
    assert!(stats.wal_records < 50);

    // everything stays readable across the flushes
    for i in 0..50 {
        assert_eq!(
            db.get(&format!("key_{i:02}")).unwrap().as_deref(),
            Some(format!("value_{i}").as_str())
        );
    }
}

// =============================================================================
// Test 6: Explicit flush seals the active log
// =============================================================================
#[test]
fn flush_seals_the_active_log() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    db.insert("a", "1").unwrap();
    db.insert("b", "2").unwrap();
    assert_eq!(db.stats().wal_records, 2);

    db.flush().unwrap();

    let stats = db.stats();
    assert_eq!(stats.wal_records, 0);
    assert_eq!(stats.tables_per_level[0], 1);
    assert_eq!(db.get("a").unwrap().as_deref(), Some("1"));

    // flushing an empty log is a no-op
    db.flush().unwrap();
    assert_eq!(db.stats().tables_per_level[0], 1);
}

// =============================================================================
// Test 7: Deleted keys stay deleted through a flush
// =============================================================================
#[test]
fn tombstone_survives_flush() {
    let dir = tempfile::tempdir().unwrap();
    let db = DB::open(options(dir.path())).unwrap();

    db.insert("k", "v1").unwrap();
    db.delete("k").unwrap();
    db.flush().unwrap();

    assert_eq!(db.get("k").unwrap(), None);
    // the tombstone beat the insert during the merge: nothing persisted
    assert_eq!(db.stats().tables_per_level[0], 0);
}

// =============================================================================
// Test 8: Reopen recovers records left in the log by a previous run
// =============================================================================
#[test]
fn reopen_recovers_leftover_log() {
    let dir = tempfile::tempdir().unwrap();

    {
        let db = DB::open(options(dir.path())).unwrap();
        db.insert("durable", "yes").unwrap();
        db.insert("gone", "soon").unwrap();
        db.delete("gone").unwrap();
        // dropped with an unmerged active log: simulated process exit
    }

    let db = DB::open(options(dir.path())).unwrap();
    assert_eq!(db.get("durable").unwrap().as_deref(), Some("yes"));
    assert_eq!(db.get("gone").unwrap(), None);

    // the leftover records were folded into level 0, not replayed into a log
    let stats = db.stats();
    assert_eq!(stats.wal_records, 0);
    assert_eq!(stats.tables_per_level[0], 1);

    // and the old log file was reclaimed: only the fresh active log remains
    let wal_files = std::fs::read_dir(dir.path().join("wal")).unwrap().count();
    assert_eq!(wal_files, 1);
}

// =============================================================================
// Test 9: Reopen after a clean flush serves from the level set
// =============================================================================
#[test]
fn reopen_reads_from_levels() {
    let dir = tempfile::tempdir().unwrap();

    {
        let db = DB::open(options(dir.path())).unwrap();
        for i in 0..20 {
            db.insert(format!("key_{i:02}"), format!("v{i}")).unwrap();
        }
        db.flush().unwrap();
    }

    let db = DB::open(options(dir.path())).unwrap();
    assert_eq!(db.stats().cache_entries, 0); // cold cache

    assert_eq!(db.get("key_07").unwrap().as_deref(), Some("v7"));
    assert_eq!(db.stats().cache_entries, 1); // read-through populated
    assert_eq!(db.get("key_07").unwrap().as_deref(), Some("v7"));
}

// =============================================================================
// Test 10: Engines are plain values — instances do not share state
// =============================================================================
#[test]
fn instances_are_isolated() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let a = DB::open(options(dir_a.path())).unwrap();
    let b = DB::open(options(dir_b.path())).unwrap();

    a.insert("k", "from_a").unwrap();
    b.insert("k", "from_b").unwrap();

    assert_eq!(a.get("k").unwrap().as_deref(), Some("from_a"));
    assert_eq!(b.get("k").unwrap().as_deref(), Some("from_b"));
}

// =============================================================================
// Test 11: Zero rotation threshold is an invalid configuration
// =============================================================================
#[test]
fn zero_rotation_threshold_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.wal_rotate_bytes = 0;

    assert!(matches!(
        DB::open(opts),
        Err(silt::Error::InvalidConfig(_))
    ));
}

// =============================================================================
// Test 12: Shared across threads — concurrent writers and readers
// =============================================================================
#[test]
fn concurrent_writers_and_readers() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.wal_rotate_bytes = 512; // keep rotations in the mix
    opts.sync_policy = SyncPolicy::Never; // speed over durability in a test

    let db = Arc::new(DB::open(opts).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..50 {
                    db.insert(format!("w{w}_k{i:02}"), format!("v{i}")).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..100 {
                    // may or may not be written yet; must never error
                    let _ = db.get(&format!("w0_k{:02}", i % 50)).unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    for w in 0..4 {
        for i in 0..50 {
            assert_eq!(
                db.get(&format!("w{w}_k{i:02}")).unwrap().as_deref(),
                Some(format!("v{i}").as_str()),
                "lost w{w}_k{i}"
            );
        }
    }
}
