use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::sstable::{BLOOM_FPR, SSTable};

/// Writes a sorted table file record by record.
///
/// Records must arrive in strictly ascending key order — the merge step
/// sorts and deduplicates before building, and [`SSTable::build`] enforces
/// it for direct callers. The builder tracks the offset index, the
/// min/max bounds, and the key filter while writing, so
/// [`finish`](TableBuilder::finish) hands back a ready-to-query table
/// without re-reading the file.
pub struct TableBuilder {
    writer: BufWriter<File>,
    path: PathBuf,
    index: Vec<u64>,
    offset: u64,
    min_key: Option<String>,
    last_key: Option<String>,
    bloom: BloomFilter,
}

impl TableBuilder {
    /// Open a new table file for writing. The create is exclusive:
    /// an occupied path fails with [`Error::AlreadyExists`].
    pub fn new(path: &Path, expected_records: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
                _ => Error::Io(e),
            })?;

        Ok(TableBuilder {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            index: Vec::with_capacity(expected_records),
            offset: 0,
            min_key: None,
            last_key: None,
            bloom: BloomFilter::new(expected_records.max(1), BLOOM_FPR),
        })
    }

    /// Append one record. MUST be called in strictly ascending key order.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if let Some(last) = &self.last_key {
            assert!(
                record.key() > last.as_str(),
                "table records must be added in strictly ascending key order"
            );
        }

        let line = record.serialize();
        self.writer.write_all(line.as_bytes())?;

        self.offset += line.len() as u64;
        self.index.push(self.offset);
        self.bloom.insert(record.key().as_bytes());

        if self.min_key.is_none() {
            self.min_key = Some(record.key().to_string());
        }
        self.last_key = Some(record.key().to_string());

        Ok(())
    }

    /// Finalize: flush, fsync, and reopen the finished file for reading.
    pub fn finish(self) -> Result<SSTable> {
        let TableBuilder {
            mut writer,
            path,
            index,
            min_key,
            last_key,
            bloom,
            ..
        } = self;

        let (Some(min_key), Some(max_key)) = (min_key, last_key) else {
            return Err(Error::InvalidConfig(
                "cannot finish a sorted table with zero records".into(),
            ));
        };

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        let file = File::open(&path)?;
        Ok(SSTable::from_parts(path, file, index, min_key, max_key, bloom))
    }
}
