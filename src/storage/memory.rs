//! In-memory storage
//!
//! Cloned handles share one table, so a test can keep a handle while the
//! importer writes through another.

use crate::error::{ImportError, Result};
use crate::ingestion::Schema;
use crate::storage::{StoragePort, StoredRows};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Table {
    schema: Option<Schema>,
    rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    table: Arc<RwLock<Table>>,
    typed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory storage that asks for inferred column types
    pub fn typed() -> Self {
        Self {
            table: Arc::default(),
            typed: true,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Table>> {
        self.table
            .read()
            .map_err(|_| ImportError::Storage("memory table lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Table>> {
        self.table
            .write()
            .map_err(|_| ImportError::Storage("memory table lock poisoned".to_string()))
    }
}

impl StoragePort for MemoryStorage {
    fn schema(&self) -> Result<Option<Schema>> {
        Ok(self.read()?.schema.clone())
    }

    fn set_schema(&self, schema: &Schema) -> Result<()> {
        self.write()?.schema = Some(schema.clone());
        Ok(())
    }

    fn store(&self, row: &[String]) -> Result<()> {
        self.store_batch(&[row.to_vec()])
    }

    fn store_batch(&self, rows: &[Vec<String>]) -> Result<()> {
        let mut table = self.write()?;
        let width = match &table.schema {
            Some(schema) => schema.len(),
            None => {
                return Err(ImportError::Storage(
                    "cannot store rows before a schema is set".to_string(),
                ))
            }
        };
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(ImportError::Storage(format!(
                "row has {} values, schema has {} fields",
                row.len(),
                width
            )));
        }
        table.rows.extend_from_slice(rows);
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.read()?.rows.len() as u64)
    }

    fn retrieve_all(&self) -> Result<StoredRows> {
        Ok(self
            .read()?
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (i as u64 + 1, row.clone()))
            .collect())
    }

    fn drop_all(&self) -> Result<()> {
        let mut table = self.write()?;
        table.schema = None;
        table.rows.clear();
        Ok(())
    }

    fn typed_schema(&self) -> bool {
        self.typed
    }
}
