use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::Record;

/// Controls when the log file is fsync'd to disk.
///
/// Trade-off: durability vs throughput. `EveryWrite` loses nothing on a
/// crash but pays one disk round-trip per append; `EveryNWrites` batches
/// that cost and risks up to N records; `Never` leaves flushing to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every record. Safest, slowest.
    EveryWrite,
    /// fsync every N records. Batched durability.
    EveryNWrites(usize),
    /// Let the OS page cache decide.
    Never,
}

/// Append-only, crash-durable log of records.
///
/// The file holds newline-terminated record lines in append order — the
/// write buffer of the engine. An in-memory index of cumulative end
/// offsets (one per record) lets the sealed log be drained record by
/// record without re-scanning.
///
/// Exactly one `Wal` is active per engine at a time. Sealing consumes the
/// value, so the type system rules out appends after
/// [`close_and_get_entries`](Wal::close_and_get_entries).
pub struct Wal {
    file: File,
    path: PathBuf,
    /// End offset of record `i` — strictly increasing.
    index: Vec<u64>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
}

impl Wal {
    /// Create a new, empty log file. The create is exclusive: an occupied
    /// path fails with [`Error::AlreadyExists`], guaranteeing each log
    /// file is written by exactly one writer for its lifetime.
    pub fn create(path: impl Into<PathBuf>, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.clone()),
                _ => Error::Io(e),
            })?;

        Ok(Wal {
            file,
            path,
            index: Vec::new(),
            offset: 0,
            sync_policy,
            writes_since_sync: 0,
        })
    }

    /// Reopen an existing log file for append, rebuilding the offset
    /// index by scanning the content from the start.
    ///
    /// A log that cannot be fully parsed — torn final line, bad field
    /// layout, non-UTF-8 bytes — is corrupt, and that is fatal for
    /// startup, not recoverable.
    pub fn restore(path: impl Into<PathBuf>, sync_policy: SyncPolicy) -> Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        let content = String::from_utf8(raw)
            .map_err(|_| Error::MalformedRecord(format!("{}: not valid UTF-8", path.display())))?;

        let mut index = Vec::new();
        let mut start = 0usize;
        while start < content.len() {
            let Some(nl) = content[start..].find('\n') else {
                return Err(Error::MalformedRecord(format!(
                    "{}: truncated trailing record",
                    path.display()
                )));
            };
            Record::deserialize(&content[start..start + nl])?;
            start += nl + 1;
            index.push(start as u64);
        }

        let offset = content.len() as u64;
        file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), records = index.len(), "restored write-ahead log");

        Ok(Wal {
            file,
            path,
            index,
            offset,
            sync_policy,
            writes_since_sync: 0,
        })
    }

    /// Append one record. This is the durability boundary: once this
    /// returns, the record is on disk (subject to the sync policy). A
    /// short write is a hard error, never retried here.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let line = record.serialize();
        self.file.write_all(line.as_bytes())?;

        self.offset += line.len() as u64;
        self.index.push(self.offset);
        self.writes_since_sync += 1;

        match self.sync_policy {
            SyncPolicy::EveryWrite => {
                self.file.sync_all()?;
                self.writes_since_sync = 0;
            }
            SyncPolicy::EveryNWrites(n) => {
                if self.writes_since_sync >= n {
                    self.file.sync_all()?;
                    self.writes_since_sync = 0;
                }
            }
            SyncPolicy::Never => {}
        }

        Ok(())
    }

    /// Force all buffered writes to physical disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Seal the log and drain its contents in append order.
    ///
    /// Consumes the log — no append can race a seal — and closes the
    /// underlying file. This is the single path by which a log's records
    /// are handed to the level set for merging. The file itself is left
    /// on disk; the caller deletes it once the records are safely merged.
    pub fn close_and_get_entries(mut self) -> Result<Vec<Record>> {
        self.file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::with_capacity(self.index.len());
        let mut prev = 0u64;
        for &end in &self.index {
            let mut buf = vec![0u8; (end - prev) as usize];
            self.file.read_exact(&mut buf)?;
            let line = std::str::from_utf8(&buf)
                .map_err(|_| Error::MalformedRecord("log record is not valid UTF-8".into()))?;
            entries.push(Record::deserialize(line.trim_end_matches('\n'))?);
            prev = end;
        }

        debug!(path = %self.path.display(), records = entries.len(), "sealed write-ahead log");
        Ok(entries)
    }

    /// Number of records appended so far.
    pub fn count(&self) -> usize {
        self.index.len()
    }

    /// Bytes written so far.
    pub fn size_bytes(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
