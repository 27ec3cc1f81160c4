//! Collaborator registry - resolves configuration references to live ports
//!
//! Serialized tasks only name their storage and row source. Storage handles
//! and open files are process-local, so every process registers its own
//! instances under those names before building or hydrating a task.

use crate::error::{ImportError, Result};
use crate::ingestion::RowSourceFactory;
use crate::storage::StoragePort;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Collaborators {
    storages: HashMap<String, Arc<dyn StoragePort>>,
    row_sources: HashMap<String, Arc<dyn RowSourceFactory>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_storage(&mut self, reference: impl Into<String>, storage: Arc<dyn StoragePort>) -> &mut Self {
        self.storages.insert(reference.into(), storage);
        self
    }

    pub fn register_row_source(
        &mut self,
        reference: impl Into<String>,
        factory: Arc<dyn RowSourceFactory>,
    ) -> &mut Self {
        self.row_sources.insert(reference.into(), factory);
        self
    }

    /// Builder form of `register_storage`
    pub fn with_storage(mut self, reference: impl Into<String>, storage: Arc<dyn StoragePort>) -> Self {
        self.register_storage(reference, storage);
        self
    }

    /// Builder form of `register_row_source`
    pub fn with_row_source(mut self, reference: impl Into<String>, factory: Arc<dyn RowSourceFactory>) -> Self {
        self.register_row_source(reference, factory);
        self
    }

    pub fn storage(&self, reference: &str) -> Result<Arc<dyn StoragePort>> {
        self.storages.get(reference).cloned().ok_or_else(|| {
            ImportError::Configuration(format!(
                "storage reference `{}` does not resolve to a StoragePort",
                reference
            ))
        })
    }

    pub fn row_source(&self, reference: &str) -> Result<Arc<dyn RowSourceFactory>> {
        self.row_sources.get(reference).cloned().ok_or_else(|| {
            ImportError::Configuration(format!(
                "row source reference `{}` does not resolve to a RowSourceFactory",
                reference
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::CsvRowSourceFactory;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_resolves_registered_references() {
        let collaborators = Collaborators::new()
            .with_storage("memory", Arc::new(MemoryStorage::new()))
            .with_row_source("csv", Arc::new(CsvRowSourceFactory::new()));

        assert!(collaborators.storage("memory").is_ok());
        assert_eq!(collaborators.row_source("csv").unwrap().source_type(), "csv");
    }

    #[test]
    fn test_unknown_reference_names_contract() {
        let collaborators = Collaborators::new();
        let err = collaborators.storage("nope").err().unwrap();
        assert!(matches!(err, ImportError::Configuration(_)));
        assert!(err.to_string().contains("StoragePort"));

        let err = collaborators.row_source("nope").err().unwrap();
        assert!(err.to_string().contains("RowSourceFactory"));
    }
}
