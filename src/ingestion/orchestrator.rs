//! Import Orchestrator - Runs one resumable, time-boxed import task
//!
//! A task is driven by repeated calls to `run()`. Every pass opens the row
//! source from the top, skips the rows storage already holds, and appends
//! until the source is exhausted or the time budget runs out.
//!
//! Only one task instance may run against a given storage at a time. The
//! cursor assumes exclusive access; concurrent passes are unsupported.

use crate::error::{ImportError, Result};
use crate::ingestion::{
    Collaborators, ImportState, Resource, RowSourceError, RowSourceFactory, SchemaBuilder, Status,
    TimeBudget,
};
use crate::storage::StoragePort;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rows handed to storage in one commit
const STORE_BATCH_ROWS: usize = 256;

/// Construction options for an import task
#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub resource: Resource,
    /// Registered name of the storage port
    pub storage: String,
    /// Registered name of the row source factory
    pub row_source: String,
    pub time_limit_seconds: Option<u64>,
}

impl ImportConfig {
    pub fn new(resource: Resource, storage: impl Into<String>, row_source: impl Into<String>) -> Self {
        Self {
            resource,
            storage: storage.into(),
            row_source: row_source.into(),
            time_limit_seconds: None,
        }
    }

    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }
}

/// Why a pass ended early. Rendered into `Status::Error`.
#[derive(Error, Debug)]
enum PassError {
    #[error(transparent)]
    RowSource(#[from] RowSourceError),

    #[error("storage failure: {0}")]
    Storage(#[from] ImportError),
}

pub struct ImportTask {
    resource: Resource,
    storage_ref: String,
    row_source_ref: String,
    storage: Arc<dyn StoragePort>,
    row_source: Arc<dyn RowSourceFactory>,
    time_limit_seconds: Option<u64>,
    status: Status,
    cursor: u64,
}

impl ImportTask {
    /// Build a task, resolving and validating its collaborators.
    ///
    /// Fails with `ImportError::Configuration` when a reference does not
    /// resolve or the row source cannot read the resource's media type.
    pub fn new(config: ImportConfig, collaborators: &Collaborators) -> Result<Self> {
        let ImportConfig {
            resource,
            storage,
            row_source,
            time_limit_seconds,
        } = config;

        if resource.id().trim().is_empty() {
            return Err(ImportError::Configuration("resource id must not be empty".to_string()));
        }
        if resource.location().trim().is_empty() {
            return Err(ImportError::Configuration(
                "resource location must not be empty".to_string(),
            ));
        }

        let storage_port = collaborators.storage(&storage)?;
        let factory = collaborators.row_source(&row_source)?;
        if !factory.supports(resource.media_type()) {
            return Err(ImportError::Configuration(format!(
                "row source `{}` is not a RowSourceFactory for media type {}",
                row_source,
                resource.media_type()
            )));
        }

        Ok(Self {
            resource,
            storage_ref: storage,
            row_source_ref: row_source,
            storage: storage_port,
            row_source: factory,
            time_limit_seconds,
            status: Status::Stopped,
            cursor: 0,
        })
    }

    /// Rebuild a task from its document, binding collaborators registered
    /// in this process.
    pub fn from_state(state: ImportState, collaborators: &Collaborators) -> Result<Self> {
        let status = state.status()?;
        let config = ImportConfig {
            resource: Resource::new(state.resource_id, state.resource_location, state.resource_media_type),
            storage: state.storage_config_ref,
            row_source: state.row_source_config_ref,
            time_limit_seconds: state.time_limit_seconds,
        };

        let mut task = Self::new(config, collaborators)?;
        task.status = status;
        task.cursor = state.cursor;
        Ok(task)
    }

    pub fn deserialize(json: &str, collaborators: &Collaborators) -> Result<Self> {
        Self::from_state(ImportState::from_json(json)?, collaborators)
    }

    pub fn to_state(&self) -> ImportState {
        ImportState {
            resource_id: self.resource.id().to_string(),
            resource_location: self.resource.location().to_string(),
            resource_media_type: self.resource.media_type().to_string(),
            storage_config_ref: self.storage_ref.clone(),
            row_source_config_ref: self.row_source_ref.clone(),
            time_limit_seconds: self.time_limit_seconds,
            status: self.status.kind(),
            error_message: self.status.error_message().map(str::to_string),
            cursor: self.cursor,
        }
    }

    pub fn serialize(&self) -> Result<String> {
        self.to_state().to_json()
    }

    /// Run one pass. Finished and failed tasks return immediately.
    pub fn run(&mut self) -> &Status {
        if self.status.is_terminal() {
            debug!("Import {} is already {}, nothing to do", self.resource.id(), self.status);
            return &self.status;
        }

        let budget = TimeBudget::from_seconds(self.time_limit_seconds);
        let before = self.cursor;

        self.status = match self.pass(&budget) {
            Ok(status) => status,
            Err(e) => {
                warn!("Import {} failed: {}", self.resource.id(), e);
                Status::Error(e.to_string())
            }
        };

        info!(
            "Import {} pass finished: {} ({} rows this pass, {} total, {:?})",
            self.resource.id(),
            self.status,
            self.cursor.saturating_sub(before),
            self.cursor,
            budget.elapsed()
        );
        &self.status
    }

    fn pass(&mut self, budget: &TimeBudget) -> std::result::Result<Status, PassError> {
        let mut rows = self.row_source.open(&self.resource)?;
        debug!(
            "Import {}: opened {} via {} row source",
            self.resource.id(),
            self.resource.location(),
            self.row_source.source_type()
        );

        let header = match rows.next() {
            Some(row) => row?,
            None => {
                return Err(RowSourceError::InvalidContent("resource has no header row".to_string()).into())
            }
        };

        // Buffered so a typed schema can look at the first data row
        let mut first_data_row = None;
        if self.storage.schema()?.is_none() {
            if self.storage.typed_schema() {
                first_data_row = rows.next().transpose()?;
            }
            let schema = SchemaBuilder::new()
                .with_typed(self.storage.typed_schema())
                .build(&header, first_data_row.as_deref());
            self.storage.set_schema(&schema)?;
            info!(
                "Import {}: created schema with {} fields",
                self.resource.id(),
                schema.len()
            );
        }

        self.reconcile_cursor()?;
        self.status = Status::InProgress;

        let width = header.len();
        let mut rows = first_data_row.map(Ok).into_iter().chain(rows);

        let mut skipped = 0;
        while skipped < self.cursor {
            match rows.next() {
                Some(row) => {
                    row?;
                    skipped += 1;
                }
                None => {
                    warn!(
                        "Import {}: storage holds {} rows but the source only has {}",
                        self.resource.id(),
                        self.cursor,
                        skipped
                    );
                    return Ok(Status::Done);
                }
            }
        }

        // Rows are committed a batch at a time; the cursor only counts
        // committed rows, so every exit path flushes first.
        let mut pending: Vec<Vec<String>> = Vec::with_capacity(STORE_BATCH_ROWS);
        for row in rows {
            let record = self.cursor + pending.len() as u64 + 1;
            let row = match row.and_then(|row| Self::fit_row(row, width, record)) {
                Ok(row) => row,
                Err(e) => {
                    self.flush(&mut pending)?;
                    return Err(e.into());
                }
            };
            pending.push(row);

            if budget.exhausted() {
                self.flush(&mut pending)?;
                debug!(
                    "Import {}: time budget spent after {:?}, suspending at row {}",
                    self.resource.id(),
                    budget.elapsed(),
                    self.cursor
                );
                return Ok(Status::Stopped);
            }
            if pending.len() >= STORE_BATCH_ROWS {
                self.flush(&mut pending)?;
            }
        }

        self.flush(&mut pending)?;
        Ok(Status::Done)
    }

    fn flush(&mut self, pending: &mut Vec<Vec<String>>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        self.storage.store_batch(pending)?;
        self.cursor += pending.len() as u64;
        pending.clear();
        Ok(())
    }

    /// Storage is authoritative; a stale serialized cursor gives way to it.
    fn reconcile_cursor(&mut self) -> Result<()> {
        let stored = self.storage.count()?;
        if stored != self.cursor {
            warn!(
                "Import {}: cursor {} disagrees with {} stored rows, resuming from storage",
                self.resource.id(),
                self.cursor,
                stored
            );
            self.cursor = stored;
        }
        Ok(())
    }

    /// Pad short rows with empty values; rows wider than the header are rejected.
    fn fit_row(mut row: Vec<String>, width: usize, record: u64) -> std::result::Result<Vec<String>, RowSourceError> {
        if row.len() > width {
            return Err(RowSourceError::InvalidContent(format!(
                "record {} has {} fields, header declares {}",
                record,
                row.len(),
                width
            )));
        }
        row.resize(width, String::new());
        Ok(row)
    }

    /// Remove all imported rows and the schema, and start over.
    pub fn drop_import(&mut self) -> Result<()> {
        self.storage.drop_all()?;
        self.cursor = 0;
        self.status = Status::Stopped;
        info!("Import {} dropped", self.resource.id());
        Ok(())
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn time_limit_seconds(&self) -> Option<u64> {
        self.time_limit_seconds
    }

    pub fn set_time_limit(&mut self, seconds: Option<u64>) {
        self.time_limit_seconds = seconds;
    }

    pub fn storage(&self) -> &Arc<dyn StoragePort> {
        &self.storage
    }

    pub fn storage_ref(&self) -> &str {
        &self.storage_ref
    }

    pub fn row_source_ref(&self) -> &str {
        &self.row_source_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::RowStream;
    use crate::storage::MemoryStorage;

    /// Row source serving fixed rows, for exercising the pass loop
    struct StaticRows(Vec<Vec<String>>);

    impl StaticRows {
        fn new<S: AsRef<str>>(rows: Vec<Vec<S>>) -> Self {
            Self(
                rows.into_iter()
                    .map(|r| r.iter().map(|s| s.as_ref().to_string()).collect())
                    .collect(),
            )
        }
    }

    impl RowSourceFactory for StaticRows {
        fn supports(&self, _media_type: &str) -> bool {
            true
        }

        fn open(&self, _resource: &Resource) -> std::result::Result<RowStream, RowSourceError> {
            let rows: Vec<std::result::Result<Vec<String>, RowSourceError>> = self
                .0
                .iter()
                .map(|r| Ok(r.clone()))
                .collect();
            Ok(Box::new(rows.into_iter()))
        }

        fn source_type(&self) -> &str {
            "static"
        }
    }

    fn task_over<S: AsRef<str>>(rows: Vec<Vec<S>>, storage: MemoryStorage) -> ImportTask {
        let collaborators = Collaborators::new()
            .with_storage("memory", Arc::new(storage))
            .with_row_source("static", Arc::new(StaticRows::new(rows)));
        ImportTask::new(
            ImportConfig::new(Resource::new("1", "static://rows", "text/csv"), "memory", "static"),
            &collaborators,
        )
        .unwrap()
    }

    #[test]
    fn test_short_rows_are_padded() {
        let storage = MemoryStorage::new();
        let mut task = task_over(vec![vec!["a", "b", "c"], vec!["1"]], storage.clone());
        assert_eq!(task.run(), &Status::Done);
        assert_eq!(storage.retrieve_all().unwrap()[&1], vec!["1", "", ""]);
    }

    #[test]
    fn test_wide_rows_fail_the_import() {
        let storage = MemoryStorage::new();
        let mut task = task_over(vec![vec!["a"], vec!["1"], vec!["2", "extra"]], storage.clone());
        let status = task.run().clone();
        assert!(status.error_message().unwrap().starts_with("invalid file content"));
        assert_eq!(task.cursor(), 1);
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_empty_resource_is_invalid() {
        let storage = MemoryStorage::new();
        let mut task = task_over(Vec::<Vec<&str>>::new(), storage.clone());
        assert!(matches!(task.run(), Status::Error(_)));
        assert!(storage.schema().unwrap().is_none());
    }

    #[test]
    fn test_header_only_resource_is_done() {
        let storage = MemoryStorage::new();
        let mut task = task_over(vec![vec!["a", "b"]], storage.clone());
        assert_eq!(task.run(), &Status::Done);
        assert_eq!(storage.count().unwrap(), 0);
        assert!(storage.schema().unwrap().is_some());
    }

    #[test]
    fn test_typed_storage_keeps_sampled_row() {
        let storage = MemoryStorage::typed();
        let mut task = task_over(
            vec![vec!["id", "price"], vec!["1", "2.5"], vec!["2", "3.0"]],
            storage.clone(),
        );
        assert_eq!(task.run(), &Status::Done);
        assert_eq!(storage.count().unwrap(), 2);

        let schema = storage.schema().unwrap().unwrap();
        assert_eq!(schema.fields[0].field_type, crate::ingestion::FieldType::Integer);
        assert_eq!(schema.fields[1].field_type, crate::ingestion::FieldType::Float);
    }

    #[test]
    fn test_rows_span_several_batches() {
        let storage = MemoryStorage::new();
        let values: Vec<String> = (0..STORE_BATCH_ROWS * 2 + 7).map(|i| i.to_string()).collect();
        let mut rows = vec![vec!["n".to_string()]];
        rows.extend(values.iter().map(|v| vec![v.clone()]));

        let mut task = task_over(rows, storage.clone());
        assert_eq!(task.run(), &Status::Done);
        assert_eq!(task.cursor(), values.len() as u64);

        let stored: Vec<String> = storage
            .retrieve_all()
            .unwrap()
            .into_values()
            .map(|row| row[0].clone())
            .collect();
        assert_eq!(stored, values);
    }

    #[test]
    fn test_bad_row_after_partial_batch_keeps_earlier_rows() {
        let storage = MemoryStorage::new();
        let mut task = task_over(
            vec![vec!["a", "b"], vec!["1", "2"], vec!["3"], vec!["4", "5", "6"], vec!["7", "8"]],
            storage.clone(),
        );
        let message = task.run().error_message().unwrap().to_string();
        assert_eq!(message, "invalid file content: record 3 has 3 fields, header declares 2");
        assert_eq!(task.cursor(), 2);
        let values: Vec<Vec<String>> = storage.retrieve_all().unwrap().into_values().collect();
        assert_eq!(values, vec![vec!["1", "2"], vec!["3", ""]]);
    }

    #[test]
    fn test_references_kept_for_the_state_document() {
        let task = task_over(vec![vec!["a"]], MemoryStorage::new());
        assert_eq!(task.storage_ref(), "memory");
        assert_eq!(task.row_source_ref(), "static");

        let state = task.to_state();
        assert_eq!(state.storage_config_ref, task.storage_ref());
        assert_eq!(state.row_source_config_ref, task.row_source_ref());
    }

    #[test]
    fn test_stale_cursor_defers_to_storage() {
        let storage = MemoryStorage::new();
        let rows = vec![vec!["a"], vec!["1"], vec!["2"], vec!["3"]];
        let mut first = task_over(rows.clone(), storage.clone());
        first.set_time_limit(Some(0));
        assert_eq!(first.run(), &Status::Stopped);

        let mut state = first.to_state();
        state.cursor = 0;
        let collaborators = Collaborators::new()
            .with_storage("memory", Arc::new(storage.clone()))
            .with_row_source("static", Arc::new(StaticRows::new(rows)));
        let mut resumed = ImportTask::from_state(state, &collaborators).unwrap();
        resumed.set_time_limit(None);

        assert_eq!(resumed.run(), &Status::Done);
        assert_eq!(resumed.cursor(), 3);
        let values: Vec<Vec<String>> = storage.retrieve_all().unwrap().into_values().collect();
        assert_eq!(values, vec![vec!["1"], vec!["2"], vec!["3"]]);
    }

    #[test]
    fn test_unsupported_media_type_is_configuration_error() {
        struct CsvOnly;
        impl RowSourceFactory for CsvOnly {
            fn supports(&self, media_type: &str) -> bool {
                media_type == "text/csv"
            }
            fn open(&self, _resource: &Resource) -> std::result::Result<RowStream, RowSourceError> {
                Ok(Box::new(std::iter::empty::<std::result::Result<Vec<String>, RowSourceError>>()))
            }
            fn source_type(&self) -> &str {
                "csv-only"
            }
        }

        let collaborators = Collaborators::new()
            .with_storage("memory", Arc::new(MemoryStorage::new()))
            .with_row_source("csv", Arc::new(CsvOnly));
        let err = ImportTask::new(
            ImportConfig::new(Resource::new("1", "doc.pdf", "application/pdf"), "memory", "csv"),
            &collaborators,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ImportError::Configuration(_)));
        assert!(err.to_string().contains("RowSourceFactory"));
    }
}
