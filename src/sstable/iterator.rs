use crate::error::Result;
use crate::record::Record;
use crate::sstable::SSTable;

/// Stateful cursor over a sorted table, in on-disk (ascending key) order.
///
/// `peek` is idempotent — it reads the next record once and holds it
/// until `advance` consumes it. Reads are lazy, one record per step. The
/// cursor is finite and not restartable; take a fresh one from
/// [`SSTable::iter`] to re-scan.
pub struct SSTableIterator<'a> {
    table: &'a SSTable,
    pos: usize,
    peeked: Option<Record>,
}

impl<'a> SSTableIterator<'a> {
    pub(crate) fn new(table: &'a SSTable) -> Self {
        SSTableIterator {
            table,
            pos: 0,
            peeked: None,
        }
    }

    /// Look at the next record without advancing. Repeated calls return
    /// the same record. `None` once the table is exhausted.
    pub fn peek(&mut self) -> Result<Option<&Record>> {
        if self.peeked.is_none() && self.pos < self.table.len() {
            self.peeked = Some(self.table.read_record_at(self.pos)?);
        }
        Ok(self.peeked.as_ref())
    }

    /// Consume and return the next record. `None` once exhausted.
    pub fn advance(&mut self) -> Result<Option<Record>> {
        if let Some(record) = self.peeked.take() {
            self.pos += 1;
            return Ok(Some(record));
        }
        if self.pos >= self.table.len() {
            return Ok(None);
        }
        let record = self.table.read_record_at(self.pos)?;
        self.pos += 1;
        Ok(Some(record))
    }
}
