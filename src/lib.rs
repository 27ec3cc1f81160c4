pub mod config;
pub mod error;
pub mod ingestion;
pub mod storage;

pub use error::{ImportError, Result};
pub use ingestion::{
    Collaborators, CsvRowSourceFactory, ImportConfig, ImportJob, ImportState, ImportTask, Resource, Status,
};
pub use storage::{MemoryStorage, SqliteStorage, StoragePort};
