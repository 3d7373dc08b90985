use std::collections::HashMap;

use crate::record::Record;

/// Collapse a merge working set down to the records worth persisting.
///
/// Keeps the record with the greatest timestamp per key; at equal
/// timestamps the later entry in the working set wins, so callers order
/// the set oldest-source-first (level tables, then the sealed log in
/// append order) and recency falls out deterministically. A winner that
/// is a tombstone is dropped outright — once the deletion has beaten
/// every older version, nothing needs to survive compaction. The output
/// is sorted by key, ready for bucketing.
pub(crate) fn resolve_latest(working: Vec<Record>) -> Vec<Record> {
    let mut latest: HashMap<String, Record> = HashMap::with_capacity(working.len());
    for record in working {
        let newest_so_far = latest
            .get(record.key())
            .is_none_or(|current| record.timestamp() >= current.timestamp());
        if newest_so_far {
            latest.insert(record.key().to_string(), record);
        }
    }

    let mut survivors: Vec<Record> = latest.into_values().filter(|r| !r.is_tombstone()).collect();
    survivors.sort_by(Record::cmp_by_key);
    survivors
}

/// Split sorted records into table-sized buckets.
///
/// Walks the records accumulating serialized byte length; a bucket closes
/// as soon as the running total reaches `max_table_bytes`. The trailing
/// partial bucket is kept as-is — no minimum size. An oversized single
/// record still gets a bucket of its own.
pub(crate) fn bucket_by_size(records: Vec<Record>, max_table_bytes: u64) -> Vec<Vec<Record>> {
    let mut buckets = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0u64;

    for record in records {
        current_bytes += record.encoded_len();
        current.push(record);
        if current_bytes >= max_table_bytes {
            buckets.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
    }
    if !current.is_empty() {
        buckets.push(current);
    }
    buckets
}
