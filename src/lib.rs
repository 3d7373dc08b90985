//! # silt
//!
//! An embedded key-value storage engine on the classic log-structured
//! merge design: durable sequential writes, periodic flush into immutable
//! sorted files, and size-driven merging across levels.
//!
//! ## Core idea
//! Every write lands in an append-only log first — sequential I/O, the
//! cheapest durability there is — and is served from an in-memory cache.
//! When the log fills up it is sealed and folded into level 0 as sorted,
//! size-bounded table files. Reads consult the cache, then the levels
//! from newest to oldest, binary-searching each candidate table.
//!
//! ```no_run
//! use silt::{DB, Options};
//!
//! # fn main() -> silt::Result<()> {
//! let db = DB::open(Options::new("/var/lib/silt/wal", "/var/lib/silt/lsm"))?;
//! db.insert("fruit", "apple")?;
//! assert_eq!(db.get("fruit")?.as_deref(), Some("apple"));
//! db.delete("fruit")?;
//! assert_eq!(db.get("fruit")?, None);
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod db;
pub mod error;
pub mod lsm;
pub mod record;
pub mod sstable;
pub mod wal;

// Public re-exports for the top-level API
pub use db::{DB, Options, Stats};
pub use error::{Error, Result};
pub use record::Record;
pub use wal::SyncPolicy;
