mod compaction;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::{Record, now_millis};
use crate::sstable::SSTable;
use crate::wal::Wal;

/// Per-level tuning: the byte size at which compaction closes a table
/// bucket and starts the next one.
#[derive(Debug, Clone)]
pub struct LevelConfig {
    pub max_table_bytes: u64,
}

/// Level-set configuration: a root directory and one [`LevelConfig`] per
/// level, ordered from level 0 upward.
#[derive(Debug, Clone)]
pub struct LsmConfig {
    pub root_dir: PathBuf,
    pub levels: Vec<LevelConfig>,
}

impl LsmConfig {
    fn verify(&self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(Error::InvalidConfig(
                "a level set needs at least one level".into(),
            ));
        }
        if let Some(bad) = self.levels.iter().position(|l| l.max_table_bytes == 0) {
            return Err(Error::InvalidConfig(format!(
                "level {bad} has a zero max table size"
            )));
        }
        if self.root_dir.exists() && !self.root_dir.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "{} exists and is not a directory",
                self.root_dir.display()
            )));
        }
        Ok(())
    }
}

/// The leveled collection of sorted tables plus the merge algorithm that
/// folds a sealed write-ahead log into level 0.
///
/// Lower levels hold more recently flushed, more authoritative data, so
/// lookups scan level 0 upward and stop at the first hit. Within a level,
/// tables are kept ordered by `min_key`; after any merge their ranges are
/// disjoint, which lets a lookup stop the level early once the key falls
/// below the next table's range.
///
/// Only the level-0 flush is implemented here. Cascading oversized levels
/// into level N+1 is an extension point — the per-level size config and
/// the numbered directories are already in place for it.
pub struct Lsm {
    levels: RwLock<Vec<Vec<SSTable>>>,
    /// Serializes merges: a later merge must see the tables an earlier
    /// one produced, or the earlier one's records would vanish in the
    /// table-list swap.
    merge_lock: Mutex<()>,
    config: LsmConfig,
}

impl Lsm {
    /// Create or restore the level set under `config.root_dir`.
    ///
    /// Each level lives in its own numbered subdirectory (`0/`, `1/`, …),
    /// created when absent. Existing directories are restored by opening
    /// every file named `<millis>.sstable`; anything else in the
    /// directory is ignored.
    pub fn initialize(config: LsmConfig) -> Result<Lsm> {
        config.verify()?;

        let mut levels = Vec::with_capacity(config.levels.len());
        for level in 0..config.levels.len() {
            let dir = config.root_dir.join(level.to_string());
            if !dir.is_dir() {
                fs::create_dir_all(&dir)?;
                levels.push(Vec::new());
                continue;
            }

            let mut tables = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if table_timestamp(&path).is_none() {
                    continue;
                }
                tables.push(SSTable::open(&path)?);
            }
            tables.sort_by(|a, b| a.min_key().cmp(b.min_key()));

            debug!(level, tables = tables.len(), "restored level");
            levels.push(tables);
        }

        info!(
            root = %config.root_dir.display(),
            levels = config.levels.len(),
            "level set ready"
        );
        Ok(Lsm {
            levels: RwLock::new(levels),
            merge_lock: Mutex::new(()),
            config,
        })
    }

    /// Point lookup, scanning levels from 0 upward so the newest data
    /// wins. Within a level the `[min_key, max_key]` bounds skip tables
    /// without opening them: past the table's max, try the next table;
    /// below its min, no later table in the (range-ordered) level can
    /// match either.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        let levels = self.levels.read().expect("lock poisoned");
        for level in levels.iter() {
            for table in level {
                if key > table.max_key() {
                    continue;
                }
                if key < table.min_key() {
                    break;
                }
                if let Some(record) = table.get(key)? {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    /// Seal a write-ahead log and merge its records into level 0.
    pub fn merge_wal(&self, wal: Wal) -> Result<()> {
        let entries = wal.close_and_get_entries()?;
        self.merge_entries(&entries)
    }

    /// Merge sealed records into level 0.
    ///
    /// Collects every record currently in level 0 plus the sealed ones
    /// (newest last), keeps the latest version per key, drops tombstone
    /// winners, sorts, buckets by the level's table size cap, builds one
    /// new table per bucket, then atomically replaces level 0's table
    /// list. Superseded files are deleted only after the swap.
    ///
    /// Any build failure removes the partly-built new files and leaves
    /// level 0 exactly as it was — the caller still owns the sealed
    /// records and can retry.
    pub fn merge_entries(&self, sealed: &[Record]) -> Result<()> {
        let _merging = self.merge_lock.lock().expect("lock poisoned");

        let mut working: Vec<Record> = Vec::new();
        {
            let levels = self.levels.read().expect("lock poisoned");
            for table in &levels[0] {
                working.extend(table.entries()?);
            }
        }
        working.extend_from_slice(sealed);

        let survivors = compaction::resolve_latest(working);
        let buckets =
            compaction::bucket_by_size(survivors, self.config.levels[0].max_table_bytes);

        let mut new_tables: Vec<SSTable> = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            match self.build_level_table(0, bucket) {
                Ok(table) => new_tables.push(table),
                Err(e) => {
                    for table in &new_tables {
                        let _ = fs::remove_file(table.path());
                    }
                    return Err(e);
                }
            }
        }

        let built = new_tables.len();
        let superseded: Vec<PathBuf> = {
            let mut levels = self.levels.write().expect("lock poisoned");
            let old = std::mem::replace(&mut levels[0], new_tables);
            old.iter().map(|t| t.path().to_path_buf()).collect()
        };
        for path in superseded {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed deleting superseded table");
            }
        }

        info!(sealed = sealed.len(), tables = built, "merged into level 0");
        Ok(())
    }

    /// Build one table in a level's directory, named by creation time in
    /// milliseconds. Collisions are resolved by the exclusive create:
    /// bump the timestamp and try again.
    fn build_level_table(&self, level: usize, records: Vec<Record>) -> Result<SSTable> {
        let dir = self.config.root_dir.join(level.to_string());
        let mut timestamp = now_millis();
        loop {
            let path = dir.join(format!("{timestamp}.sstable"));
            match SSTable::build(&path, records.clone()) {
                Err(Error::AlreadyExists(_)) => timestamp += 1,
                other => return other,
            }
        }
    }

    /// Number of tables currently held at each level.
    pub fn table_counts(&self) -> Vec<usize> {
        let levels = self.levels.read().expect("lock poisoned");
        levels.iter().map(Vec::len).collect()
    }

    pub fn level_count(&self) -> usize {
        self.config.levels.len()
    }
}

/// Parse the creation timestamp out of a `<millis>.sstable` filename;
/// `None` for anything that does not match.
fn table_timestamp(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != "sstable" {
        return None;
    }
    path.file_stem()?.to_str()?.parse::<u64>().ok()
}
