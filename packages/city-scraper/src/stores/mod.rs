//! Record storage.
//!
//! Available backends:
//! - `RecordStore` - in-memory, deduplicating by natural key (always available)
//! - `SqliteSink` - upserts snapshots into SQLite (requires `sqlite` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{IngestStats, RecordStore, Snapshot};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;
