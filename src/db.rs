use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lsm::{LevelConfig, Lsm, LsmConfig};
use crate::record::{Record, now_millis};
use crate::wal::{SyncPolicy, Wal};

const KB: u64 = 1 << 10;
const MB: u64 = 1 << 20;

/// Engine configuration. Directories are required; everything else has a
/// workable default.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory for write-ahead log files (`<millis>.wal`).
    pub wal_dir: PathBuf,
    /// Root directory for the level set (`0/`, `1/`, … subdirectories).
    pub lsm_dir: PathBuf,
    /// Maximum table byte size per level, level 0 first. Also the level
    /// count.
    pub level_max_bytes: Vec<u64>,
    /// Rotation trigger: once the active log reaches this many bytes, it
    /// is sealed and merged into level 0.
    pub wal_rotate_bytes: u64,
    /// Durability policy for log appends.
    pub sync_policy: SyncPolicy,
}

impl Options {
    pub fn new(wal_dir: impl Into<PathBuf>, lsm_dir: impl Into<PathBuf>) -> Self {
        Options {
            wal_dir: wal_dir.into(),
            lsm_dir: lsm_dir.into(),
            level_max_bytes: vec![10 * KB, 100 * KB, MB, 10 * MB, 100 * MB],
            wal_rotate_bytes: 100 * KB,
            sync_policy: SyncPolicy::EveryWrite,
        }
    }

    fn verify(&self) -> Result<()> {
        if self.wal_rotate_bytes == 0 {
            return Err(Error::InvalidConfig(
                "wal_rotate_bytes must be greater than zero".into(),
            ));
        }
        // the level list is verified by the level set itself
        Ok(())
    }
}

/// Counters for introspection and tests.
#[derive(Debug, Clone)]
pub struct Stats {
    pub cache_entries: usize,
    pub wal_records: usize,
    pub wal_bytes: u64,
    pub tables_per_level: Vec<usize>,
}

/// The active log and the read-through cache move together: every durable
/// append updates the cache under the same write lock, and rotation swaps
/// the log under it too, so readers never observe a half-sealed state.
struct WriteState {
    wal: Wal,
    cache: HashMap<String, Record>,
}

/// The storage engine: an active write-ahead log, a leveled set of sorted
/// tables, and an in-memory read-through cache.
///
/// Writes append to the log (the durability boundary) and then update the
/// cache. Reads consult the cache, then the level set, newest level
/// first. When the active log outgrows the configured threshold it is
/// sealed, merged into level 0, and replaced by a fresh log file.
///
/// A `DB` is a plain value built from [`Options`] — multiple engines over
/// different directories coexist happily in one process. All methods take
/// `&self`; internal locking makes the engine safe to share across
/// threads.
pub struct DB {
    state: RwLock<WriteState>,
    /// Serializes seal-and-merge so logs reach level 0 in the order they
    /// were sealed. Held across the merge; the `state` lock is not, so
    /// readers and writers keep moving against the fresh log.
    rotate_lock: Mutex<()>,
    lsm: Lsm,
    opts: Options,
}

impl DB {
    /// Open an engine: create the directories as needed, restore the
    /// level set, fold any leftover log files from a previous run into
    /// level 0, and start a fresh active log with an empty cache.
    pub fn open(opts: Options) -> Result<DB> {
        opts.verify()?;
        fs::create_dir_all(&opts.wal_dir)?;

        let lsm = Lsm::initialize(LsmConfig {
            root_dir: opts.lsm_dir.clone(),
            levels: opts
                .level_max_bytes
                .iter()
                .map(|&max_table_bytes| LevelConfig { max_table_bytes })
                .collect(),
        })?;

        recover_leftover_wals(&opts, &lsm)?;

        let wal = create_wal_file(&opts)?;
        info!(
            wal = %wal.path().display(),
            lsm = %opts.lsm_dir.display(),
            "engine open"
        );

        Ok(DB {
            state: RwLock::new(WriteState {
                wal,
                cache: HashMap::new(),
            }),
            rotate_lock: Mutex::new(()),
            lsm,
            opts,
        })
    }

    /// Look up a key. `None` means not found — including keys whose most
    /// recent record is a tombstone; a deletion is never surfaced as
    /// data.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let state = self.state.read().expect("lock poisoned");
            if let Some(record) = state.cache.get(key) {
                return Ok(record.value().map(str::to_string));
            }
        }

        match self.lsm.get(key)? {
            Some(record) => {
                let value = record.value().map(str::to_string);
                let mut state = self.state.write().expect("lock poisoned");
                // populate unless a write raced in — whatever is there now
                // is at least as new as what the tables returned
                if let Entry::Vacant(slot) = state.cache.entry(key.to_string()) {
                    slot.insert(record);
                }
                Ok(value)
            }
            None => Ok(None),
        }
    }

    /// Insert or update a key.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.apply(Record::new(key, value)?)
    }

    /// Delete a key by writing a tombstone. Deleting an absent key is
    /// fine — the tombstone simply wins over nothing.
    pub fn delete(&self, key: impl Into<String>) -> Result<()> {
        self.apply(Record::tombstone(key)?)
    }

    /// Seal the active log into level 0 right now, regardless of size.
    /// A no-op when the log is empty.
    pub fn flush(&self) -> Result<()> {
        self.rotate(false)
    }

    /// Engine counters: cache size, active log fill, tables per level.
    pub fn stats(&self) -> Stats {
        let state = self.state.read().expect("lock poisoned");
        Stats {
            cache_entries: state.cache.len(),
            wal_records: state.wal.count(),
            wal_bytes: state.wal.size_bytes(),
            tables_per_level: self.lsm.table_counts(),
        }
    }

    /// Write-through: durable append first, cache second. An append
    /// failure propagates without touching the cache.
    fn apply(&self, record: Record) -> Result<()> {
        let full = {
            let mut state = self.state.write().expect("lock poisoned");
            state.wal.append(&record)?;
            state.cache.insert(record.key().to_string(), record);
            state.wal.size_bytes() >= self.opts.wal_rotate_bytes
        };

        if full {
            self.rotate(true)?;
        }
        Ok(())
    }

    /// Swap in a fresh log, seal the old one, merge it into level 0, and
    /// delete the sealed file. The sealed file stays on disk until its
    /// records are durably in level 0 — if the merge fails, the next
    /// [`DB::open`] sweep retries it instead of losing the records.
    fn rotate(&self, only_if_full: bool) -> Result<()> {
        let _rotating = self.rotate_lock.lock().expect("lock poisoned");

        let (sealed_path, entries) = {
            let mut state = self.state.write().expect("lock poisoned");
            // re-check under the lock; another writer may have rotated first
            if only_if_full && state.wal.size_bytes() < self.opts.wal_rotate_bytes {
                return Ok(());
            }
            if state.wal.count() == 0 {
                return Ok(());
            }

            let fresh = create_wal_file(&self.opts)?;
            let sealed = std::mem::replace(&mut state.wal, fresh);
            let path = sealed.path().to_path_buf();
            (path, sealed.close_and_get_entries()?)
        };

        self.lsm.merge_entries(&entries)?;
        fs::remove_file(&sealed_path)?;
        info!(records = entries.len(), "rotated log into level 0");
        Ok(())
    }
}

/// Create a log file named by the current time, bumping the timestamp on
/// a collision until the exclusive create wins.
fn create_wal_file(opts: &Options) -> Result<Wal> {
    let mut timestamp = now_millis();
    loop {
        let path = opts.wal_dir.join(format!("{timestamp}.wal"));
        match Wal::create(&path, opts.sync_policy) {
            Err(Error::AlreadyExists(_)) => timestamp += 1,
            other => return other,
        }
    }
}

/// Fold log files left by a previous run — a crash, or a merge that
/// failed after sealing — into level 0, oldest first, deleting each file
/// once its records are safely merged.
fn recover_leftover_wals(opts: &Options, lsm: &Lsm) -> Result<()> {
    let mut leftovers: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&opts.wal_dir)? {
        let path = entry?.path();
        if let Some(timestamp) = wal_timestamp(&path) {
            leftovers.push((timestamp, path));
        }
    }
    if leftovers.is_empty() {
        return Ok(());
    }
    leftovers.sort_by_key(|(timestamp, _)| *timestamp);

    for (_, path) in leftovers {
        let wal = Wal::restore(&path, opts.sync_policy)?;
        let records = wal.count();
        let entries = wal.close_and_get_entries()?;
        if !entries.is_empty() {
            lsm.merge_entries(&entries)?;
        }
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed deleting recovered log");
        }
        info!(path = %path.display(), records, "recovered leftover log");
    }
    Ok(())
}

/// Parse the creation timestamp out of a `<millis>.wal` filename.
fn wal_timestamp(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != "wal" {
        return None;
    }
    path.file_stem()?.to_str()?.parse::<u64>().ok()
}
