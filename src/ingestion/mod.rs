//! Ingestion Module - Resumable, time-boxed import of delimited resources
//!
//! An import runs in passes. Each pass:
//! - opens the row source and reads the header
//! - builds and persists the schema once
//! - skips rows already committed and appends the rest
//! - suspends when the time budget is spent

pub mod resource;
pub mod connector;
pub mod csv_connector;
pub mod schema_inference;
pub mod time_budget;
pub mod collaborators;
pub mod state;
pub mod orchestrator;
pub mod job_store;

pub use resource::Resource;
pub use connector::{RowSourceFactory, RowSourceError, RowStream};
pub use csv_connector::{CsvRowSourceFactory, CsvOptions};
pub use schema_inference::{SchemaBuilder, Schema, Field, FieldType, sanitize_header, MAX_COLUMN_LENGTH};
pub use time_budget::TimeBudget;
pub use collaborators::Collaborators;
pub use state::{ImportState, StatusKind};
pub use orchestrator::{ImportTask, ImportConfig};
pub use job_store::{JobStore, MemoryJobStore, FileJobStore, ImportJob};

use std::fmt;

/// Status of an import task
///
/// `Stopped` is both the initial state and the state after a suspension or
/// a drop. Only `Error` carries a message.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Stopped,
    InProgress,
    Done,
    Error(String),
}

impl Status {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Status::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Done and Error end the task; Stopped asks for another pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Error(_))
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            Status::Stopped => StatusKind::Stopped,
            Status::InProgress => StatusKind::InProgress,
            Status::Done => StatusKind::Done,
            Status::Error(_) => StatusKind::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Stopped => write!(f, "stopped"),
            Status::InProgress => write!(f, "in progress"),
            Status::Done => write!(f, "done"),
            Status::Error(message) => write!(f, "error: {}", message),
        }
    }
}
