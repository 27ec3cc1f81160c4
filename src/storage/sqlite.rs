//! SQLite storage
//!
//! Each task identity gets its own data table. Schemas are kept as JSON in
//! a shared `import_schemas` table so they survive process restarts.
//!
//! Data columns are always TEXT so values read back exactly as imported.
//! Inferred field types live in the schema document only.

use crate::error::{ImportError, Result};
use crate::ingestion::Schema;
use crate::storage::{StoragePort, StoredRows};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA_TABLE: &str = "import_schemas";

/// Row id column. Sanitized header names never start with two underscores.
const ROW_ID: &str = "__record_number";

struct Inner {
    conn: Connection,
    /// INSERT statement for the current schema, built on first store
    insert_sql: Option<(String, usize)>,
}

pub struct SqliteStorage {
    inner: Mutex<Inner>,
    table: String,
    typed: bool,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

impl SqliteStorage {
    /// Open (or create) a database file and bind to `table`
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened datastore {} for table {}", path.display(), table);
        Self::with_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(ImportError::Configuration(
                "sqlite storage needs a non-empty table name".to_string(),
            ));
        }

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (table_name TEXT PRIMARY KEY, schema TEXT NOT NULL)",
                SCHEMA_TABLE
            ),
            [],
        )?;

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                insert_sql: None,
            }),
            table: table.to_string(),
            typed: false,
        })
    }

    /// Record field types inferred from a sampled data row in the schema
    pub fn with_typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ImportError::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn load_schema(conn: &Connection, table: &str) -> Result<Option<Schema>> {
        let json: Option<String> = conn
            .query_row(
                &format!("SELECT schema FROM {} WHERE table_name = ?1", SCHEMA_TABLE),
                params![table],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(ImportError::from))
            .transpose()
    }

    /// INSERT statement and width for the current schema, built once per schema
    fn insert_statement(inner: &mut Inner, table: &str) -> Result<(String, usize)> {
        if let Some((sql, width)) = &inner.insert_sql {
            return Ok((sql.clone(), *width));
        }

        let schema = Self::load_schema(&inner.conn, table)?
            .ok_or_else(|| ImportError::Storage(format!("table {} has no schema yet", table)))?;
        let names: Vec<String> = schema.fields.iter().map(|f| quote_ident(&f.name)).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders.join(", ")
        );
        inner.insert_sql = Some((sql.clone(), names.len()));
        Ok((sql, names.len()))
    }

    fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl StoragePort for SqliteStorage {
    fn schema(&self) -> Result<Option<Schema>> {
        let inner = self.lock()?;
        Self::load_schema(&inner.conn, &self.table)
    }

    fn set_schema(&self, schema: &Schema) -> Result<()> {
        let mut inner = self.lock()?;
        let table = quote_ident(&self.table);

        let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(ROW_ID))];
        columns.extend(
            schema
                .fields
                .iter()
                .map(|f| format!("{} TEXT", quote_ident(&f.name))),
        );

        let tx = inner.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        tx.execute(&format!("CREATE TABLE {} ({})", table, columns.join(", ")), [])?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (table_name, schema) VALUES (?1, ?2)",
                SCHEMA_TABLE
            ),
            params![self.table, serde_json::to_string(schema)?],
        )?;
        tx.commit()?;

        inner.insert_sql = None;
        debug!("Created table {} with {} columns", self.table, schema.len());
        Ok(())
    }

    fn store(&self, row: &[String]) -> Result<()> {
        self.store_batch(&[row.to_vec()])
    }

    /// All rows commit in one transaction, or none do
    fn store_batch(&self, rows: &[Vec<String>]) -> Result<()> {
        let mut inner = self.lock()?;
        let (sql, width) = Self::insert_statement(&mut inner, &self.table)?;
        if let Some(row) = rows.iter().find(|row| row.len() != width) {
            return Err(ImportError::Storage(format!(
                "row has {} values, schema has {} fields",
                row.len(),
                width
            )));
        }

        let tx = inner.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let inner = self.lock()?;
        if !Self::table_exists(&inner.conn, &self.table)? {
            return Ok(0);
        }
        let count: i64 = inner.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn retrieve_all(&self) -> Result<StoredRows> {
        let inner = self.lock()?;
        if !Self::table_exists(&inner.conn, &self.table)? {
            return Ok(StoredRows::new());
        }

        let mut stmt = inner.conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {}",
            quote_ident(&self.table),
            quote_ident(ROW_ID)
        ))?;
        let width = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(width.saturating_sub(1));
            for i in 1..width {
                values.push(value_to_string(row.get_ref(i)?));
            }
            Ok((id as u64, values))
        })?;

        let mut out = StoredRows::new();
        for row in rows {
            let (id, values) = row?;
            out.insert(id, values);
        }
        Ok(out)
    }

    fn drop_all(&self) -> Result<()> {
        let mut inner = self.lock()?;
        let tx = inner.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&self.table)), [])?;
        tx.execute(
            &format!("DELETE FROM {} WHERE table_name = ?1", SCHEMA_TABLE),
            params![self.table],
        )?;
        tx.commit()?;
        inner.insert_sql = None;
        info!("Dropped table {}", self.table);
        Ok(())
    }

    fn typed_schema(&self) -> bool {
        self.typed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{FieldType, SchemaBuilder};

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn seeded(table: &str) -> SqliteStorage {
        let storage = SqliteStorage::in_memory(table).unwrap();
        storage
            .set_schema(&SchemaBuilder::new().build(&row(&["Country", "Capital City"]), None))
            .unwrap();
        storage
    }

    #[test]
    fn test_schema_round_trip() {
        let storage = seeded("countries");
        let schema = storage.schema().unwrap().unwrap();
        assert_eq!(schema.names(), vec!["country", "capital_city"]);
    }

    #[test]
    fn test_store_count_retrieve() {
        let storage = seeded("countries");
        storage.store(&row(&["US", "Washington"])).unwrap();
        storage.store(&row(&["CU", "Havana"])).unwrap();

        assert_eq!(storage.count().unwrap(), 2);
        let rows = storage.retrieve_all().unwrap();
        assert_eq!(rows.get(&1), Some(&row(&["US", "Washington"])));
        assert_eq!(rows.get(&2), Some(&row(&["CU", "Havana"])));
    }

    #[test]
    fn test_store_without_schema_fails() {
        let storage = SqliteStorage::in_memory("empty").unwrap();
        assert!(storage.store(&row(&["x"])).is_err());
        assert_eq!(storage.count().unwrap(), 0);
        assert!(storage.retrieve_all().unwrap().is_empty());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let storage = seeded("countries");
        assert!(storage.store(&row(&["US"])).is_err());
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_drop_all() {
        let storage = seeded("countries");
        storage.store(&row(&["US", "Washington"])).unwrap();
        storage.drop_all().unwrap();

        assert_eq!(storage.count().unwrap(), 0);
        assert!(storage.schema().unwrap().is_none());
        assert!(storage.store(&row(&["US", "Washington"])).is_err());
    }

    #[test]
    fn test_typed_values_read_back_verbatim() {
        let storage = SqliteStorage::in_memory("prices").unwrap().with_typed(true);
        assert!(storage.typed_schema());
        assert_eq!(storage.table(), "prices");

        let header = row(&["id", "price"]);
        let rows = vec![row(&["007", "3.0"]), row(&["99999999999999999999", "2.50"])];
        storage
            .set_schema(&SchemaBuilder::new().with_typed(true).build(&header, Some(&rows[0])))
            .unwrap();
        storage.store_batch(&rows).unwrap();

        let stored: Vec<Vec<String>> = storage.retrieve_all().unwrap().into_values().collect();
        assert_eq!(stored, rows);

        let schema = storage.schema().unwrap().unwrap();
        assert_eq!(schema.fields[0].field_type, FieldType::Integer);
        assert_eq!(schema.fields[1].field_type, FieldType::Float);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let storage = seeded("countries");
        let bad = vec![row(&["US", "Washington"]), row(&["CU"])];
        assert!(storage.store_batch(&bad).is_err());
        assert_eq!(storage.count().unwrap(), 0);

        let good = vec![row(&["US", "Washington"]), row(&["CU", "Havana"]), row(&["MX", "Mexico City"])];
        storage.store_batch(&good).unwrap();
        storage.store(&row(&["CA", "Ottawa"])).unwrap();
        assert_eq!(storage.count().unwrap(), 4);
        assert_eq!(storage.retrieve_all().unwrap().get(&4), Some(&row(&["CA", "Ottawa"])));
    }

    #[test]
    fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("datastore.sqlite");
        {
            let storage = SqliteStorage::open(&db, "countries").unwrap();
            storage
                .set_schema(&SchemaBuilder::new().build(&row(&["a"]), None))
                .unwrap();
            storage.store(&row(&["1"])).unwrap();
        }
        let reopened = SqliteStorage::open(&db, "countries").unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert!(reopened.schema().unwrap().is_some());
    }

    #[test]
    fn test_tables_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("datastore.sqlite");
        let a = SqliteStorage::open(&db, "a").unwrap();
        let b = SqliteStorage::open(&db, "b").unwrap();
        a.set_schema(&SchemaBuilder::new().build(&row(&["x"]), None)).unwrap();
        a.store(&row(&["1"])).unwrap();

        assert_eq!(a.count().unwrap(), 1);
        assert_eq!(b.count().unwrap(), 0);
        assert!(b.schema().unwrap().is_none());
    }
}
