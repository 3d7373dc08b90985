pub mod builder;
pub mod iterator;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::record::Record;

use builder::TableBuilder;
use iterator::SSTableIterator;

/// Target false positive rate for the per-table key filter.
const BLOOM_FPR: f64 = 0.01;

/// An immutable, on-disk, key-sorted run of records.
///
/// The file is nothing but record lines in ascending key order; everything
/// else lives in memory and is rebuilt by scanning on open:
/// - the offset index (cumulative end offset of each record), which makes
///   point lookups a binary search reading one record per probe;
/// - the `[min_key, max_key]` bounds, which let the level set skip whole
///   tables without opening them;
/// - a Bloom filter over the keys, which turns most absent-key probes into
///   a pure in-memory rejection.
///
/// Tables are write-once: compaction builds new files and swaps pointers,
/// it never edits bytes in place. Concurrent lookups share the file handle
/// behind a mutex.
pub struct SSTable {
    path: PathBuf,
    file: Mutex<File>,
    /// End offset of record `i` — strictly increasing, one per record.
    index: Vec<u64>,
    min_key: String,
    max_key: String,
    bloom: BloomFilter,
}

impl SSTable {
    /// Build a new table at `path` from `records`.
    ///
    /// The input must be non-empty; it is sorted by key here if the caller
    /// did not. Duplicate keys are rejected — deduplication is the merge
    /// step's job, a sorted table holds one record per key. The create is
    /// exclusive ([`Error::AlreadyExists`] on collision), and a build that
    /// fails partway removes its half-written file: a failed build never
    /// leaves a table behind.
    pub fn build(path: impl Into<PathBuf>, mut records: Vec<Record>) -> Result<SSTable> {
        let path = path.into();
        if records.is_empty() {
            return Err(Error::InvalidConfig(
                "cannot build a sorted table from zero records".into(),
            ));
        }

        records.sort_by(Record::cmp_by_key);
        for pair in records.windows(2) {
            if pair[0].key() == pair[1].key() {
                return Err(Error::InvalidConfig(format!(
                    "duplicate key in table input: {:?}",
                    pair[0].key()
                )));
            }
        }

        let mut table_builder = TableBuilder::new(&path, records.len())?;
        let run = move || -> Result<SSTable> {
            for record in &records {
                table_builder.add(record)?;
            }
            table_builder.finish()
        };

        let built = run();
        if built.is_err() {
            // the exclusive create above succeeded, so the path is ours
            let _ = std::fs::remove_file(&path);
        }
        built
    }

    /// Open an existing table file, rebuilding the offset index, bounds,
    /// and key filter by scanning it once.
    ///
    /// The scan validates the whole file: a torn final line, an
    /// unparsable record, an empty file, or out-of-order keys all fail
    /// with [`Error::MalformedRecord`] — a corrupt table must never
    /// silently serve wrong data.
    pub fn open(path: impl Into<PathBuf>) -> Result<SSTable> {
        let path = path.into();
        let mut file = File::open(&path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        let content = String::from_utf8(raw)
            .map_err(|_| Error::MalformedRecord(format!("{}: not valid UTF-8", path.display())))?;

        let mut index = Vec::new();
        let mut keys = Vec::new();
        let mut start = 0usize;
        while start < content.len() {
            let Some(nl) = content[start..].find('\n') else {
                return Err(Error::MalformedRecord(format!(
                    "{}: truncated trailing record",
                    path.display()
                )));
            };
            let record = Record::deserialize(&content[start..start + nl])?;
            keys.push(record.key().to_string());
            start += nl + 1;
            index.push(start as u64);
        }

        if keys.is_empty() {
            return Err(Error::MalformedRecord(format!(
                "{}: table file holds no records",
                path.display()
            )));
        }
        for pair in keys.windows(2) {
            if pair[0].as_bytes() >= pair[1].as_bytes() {
                return Err(Error::MalformedRecord(format!(
                    "{}: keys out of order ({:?} then {:?})",
                    path.display(),
                    pair[0],
                    pair[1]
                )));
            }
        }

        let mut bloom = BloomFilter::new(keys.len(), BLOOM_FPR);
        for key in &keys {
            bloom.insert(key.as_bytes());
        }

        let min_key = keys.first().cloned().unwrap_or_default();
        let max_key = keys.last().cloned().unwrap_or_default();

        Ok(SSTable {
            path,
            file: Mutex::new(file),
            index,
            min_key,
            max_key,
            bloom,
        })
    }

    /// Point lookup.
    ///
    /// 1. Bounds short-circuit: outside `[min_key, max_key]` returns
    ///    `None` without touching the file.
    /// 2. Bloom filter: a definite miss returns `None`, still no I/O.
    /// 3. Binary search over the offset index, reading exactly one
    ///    record's byte range per probe.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        if key < self.min_key.as_str() || key > self.max_key.as_str() {
            return Ok(None);
        }
        if !self.bloom.may_contain(key.as_bytes()) {
            return Ok(None);
        }

        let mut lo = 0usize;
        let mut hi = self.index.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = self.read_record_at(mid)?;
            match record.key().cmp(key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(record)),
            }
        }
        Ok(None)
    }

    /// A cursor over the table in ascending key order. Lazily reads one
    /// record at a time; create a new iterator to re-scan.
    pub fn iter(&self) -> SSTableIterator<'_> {
        SSTableIterator::new(self)
    }

    /// Materialize every record in order. Used by compaction to fold this
    /// table into a merge working set.
    pub fn entries(&self) -> Result<Vec<Record>> {
        let mut file = self.file.lock().expect("lock poisoned");
        file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::with_capacity(self.index.len());
        let mut prev = 0u64;
        for &end in &self.index {
            let mut buf = vec![0u8; (end - prev) as usize];
            file.read_exact(&mut buf)?;
            let line = std::str::from_utf8(&buf)
                .map_err(|_| Error::MalformedRecord("table record is not valid UTF-8".into()))?;
            entries.push(Record::deserialize(line.trim_end_matches('\n'))?);
            prev = end;
        }
        Ok(entries)
    }

    /// Read the record at index position `pos`.
    pub(crate) fn read_record_at(&self, pos: usize) -> Result<Record> {
        let start = if pos == 0 { 0 } else { self.index[pos - 1] };
        let end = self.index[pos];

        let mut buf = vec![0u8; (end - start) as usize];
        {
            let mut file = self.file.lock().expect("lock poisoned");
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut buf)?;
        }

        let line = std::str::from_utf8(&buf)
            .map_err(|_| Error::MalformedRecord("table record is not valid UTF-8".into()))?;
        Record::deserialize(line.trim_end_matches('\n'))
    }

    /// Smallest key in the table (inclusive bound).
    pub fn min_key(&self) -> &str {
        &self.min_key
    }

    /// Largest key in the table (inclusive bound).
    pub fn max_key(&self) -> &str {
        &self.max_key
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total serialized size in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.index.last().copied().unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn from_parts(
        path: PathBuf,
        file: File,
        index: Vec<u64>,
        min_key: String,
        max_key: String,
        bloom: BloomFilter,
    ) -> SSTable {
        SSTable {
            path,
            file: Mutex::new(file),
            index,
            min_key,
            max_key,
            bloom,
        }
    }
}
