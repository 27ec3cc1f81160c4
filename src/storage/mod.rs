//! Storage Port - where imported rows and schemas live
//!
//! The importer treats `count()` as the ground truth for how far an import
//! got, so implementations must only count rows that were committed.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::ingestion::Schema;
use std::collections::BTreeMap;

/// Rows keyed by 1-based row id, in insertion order
pub type StoredRows = BTreeMap<u64, Vec<String>>;

/// Storage Port Trait
///
/// One storage instance holds the data of one task identity. Methods take
/// `&self`; implementations guard their state internally.
pub trait StoragePort: Send + Sync {
    fn schema(&self) -> Result<Option<Schema>>;

    fn set_schema(&self, schema: &Schema) -> Result<()>;

    /// Append one data row. Fails if no schema has been set.
    fn store(&self, row: &[String]) -> Result<()>;

    /// Append rows in order. Backends that can should commit them together
    /// so `count()` never sees part of a batch.
    fn store_batch(&self, rows: &[Vec<String>]) -> Result<()> {
        for row in rows {
            self.store(row)?;
        }
        Ok(())
    }

    /// Number of data rows committed
    fn count(&self) -> Result<u64>;

    fn retrieve_all(&self) -> Result<StoredRows>;

    /// Remove every row and the schema
    fn drop_all(&self) -> Result<()>;

    /// Whether the backend wants column types inferred instead of all text
    fn typed_schema(&self) -> bool {
        false
    }
}
