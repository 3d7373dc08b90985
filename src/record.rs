use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Separates the fields of a serialized record line. Keys must never
/// contain it — that is a caller error, rejected at construction.
pub const DELIMITER: char = '|';

/// The atomic unit every layer stores and transports.
///
/// A record is either live (key + value) or a tombstone (key only, marking
/// the key deleted as of `timestamp`). Records are immutable once built;
/// an update is a new record with a newer timestamp.
///
/// Wire format, one newline-terminated line per record:
/// ```text
/// live:       key|timestamp|value
/// tombstone:  key|timestamp
/// ```
/// The timestamp is persisted so "latest wins" merging stays correct
/// across restarts. Parsing splits into at most three fields, so values
/// may contain the delimiter; keys may not.
#[derive(Debug, Clone)]
pub struct Record {
    key: String,
    value: String,
    tombstone: bool,
    timestamp: u64,
}

impl Record {
    /// Create a live record stamped with the current time.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        validate_key(&key)?;
        if value.contains('\n') {
            return Err(Error::InvalidValue("value contains a newline".into()));
        }
        Ok(Record {
            key,
            value,
            tombstone: false,
            timestamp: now_millis(),
        })
    }

    /// Create a deletion marker stamped with the current time.
    pub fn tombstone(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        Ok(Record {
            key,
            value: String::new(),
            tombstone: true,
            timestamp: now_millis(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value, or `None` for a tombstone. A live record may carry an
    /// empty string — that is a real value, distinct from deletion.
    pub fn value(&self) -> Option<&str> {
        if self.tombstone { None } else { Some(&self.value) }
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    /// Creation time in milliseconds since the Unix epoch. Only used to
    /// pick the most recent record per key during merging — never a sort
    /// key, never part of equality.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serialize to one newline-terminated line.
    pub fn serialize(&self) -> String {
        if self.tombstone {
            format!("{}{DELIMITER}{}\n", self.key, self.timestamp)
        } else {
            format!("{}{DELIMITER}{}{DELIMITER}{}\n", self.key, self.timestamp, self.value)
        }
    }

    /// Parse one line's worth of bytes (without the trailing newline).
    ///
    /// Two fields make a tombstone, three a live record; anything else is
    /// corrupt. The third field is taken verbatim, so a value containing
    /// the delimiter round-trips.
    pub fn deserialize(line: &str) -> Result<Self> {
        if line.contains('\n') {
            return Err(Error::MalformedRecord("line contains a newline".into()));
        }

        let mut fields = line.splitn(3, DELIMITER);
        let key = match fields.next() {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => return Err(Error::MalformedRecord("missing key field".into())),
        };
        let timestamp = match fields.next() {
            Some(ts) => ts
                .parse::<u64>()
                .map_err(|_| Error::MalformedRecord(format!("bad timestamp field: {ts:?}")))?,
            None => return Err(Error::MalformedRecord("missing timestamp field".into())),
        };

        let (value, tombstone) = match fields.next() {
            Some(v) => (v.to_string(), false),
            None => (String::new(), true),
        };

        Ok(Record {
            key,
            value,
            tombstone,
            timestamp,
        })
    }

    /// Serialized byte length, used by compaction to size table buckets.
    pub fn encoded_len(&self) -> u64 {
        self.serialize().len() as u64
    }

    /// Total order by key bytes only. Recency is resolved separately,
    /// during deduplication.
    pub fn cmp_by_key(a: &Record, b: &Record) -> Ordering {
        a.key.as_bytes().cmp(b.key.as_bytes())
    }
}

/// Equality ignores the timestamp: two records are the same datum if they
/// agree on key, value, and liveness.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value && self.tombstone == other.tombstone
    }
}

impl Eq for Record {}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key is empty".into()));
    }
    if key.contains(DELIMITER) {
        return Err(Error::InvalidKey(format!(
            "key {key:?} contains the delimiter {DELIMITER:?}"
        )));
    }
    if key.contains('\n') {
        return Err(Error::InvalidKey(format!("key {key:?} contains a newline")));
    }
    Ok(())
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
