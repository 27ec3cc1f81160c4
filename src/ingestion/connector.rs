//! Row Source Contract - Abstract interface for tabular inputs

use crate::ingestion::Resource;
use thiserror::Error;

/// Failures a row source can surface. The importer turns these into an
/// error status rather than propagating them.
#[derive(Error, Debug)]
pub enum RowSourceError {
    #[error("resource not found: {location}")]
    NotFound {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resource not found: {location} is unreadable ({reason})")]
    Unreadable { location: String, reason: String },

    #[error("invalid file content: {0}")]
    InvalidContent(String),
}

impl RowSourceError {
    /// True when the bytes could not be reached at all, as opposed to
    /// bytes that were read but are not valid text.
    pub fn is_missing(&self) -> bool {
        matches!(self, RowSourceError::NotFound { .. } | RowSourceError::Unreadable { .. })
    }
}

/// Lazy, finite, forward-only sequence of raw rows. The first row is the
/// header. A stream cannot be rewound, so every pass opens a new one.
pub type RowStream = Box<dyn Iterator<Item = Result<Vec<String>, RowSourceError>>>;

/// Row Source Factory Trait
///
/// Implementations:
/// - CsvRowSourceFactory: comma and tab separated files
pub trait RowSourceFactory: Send + Sync {
    /// Whether this factory can decode the given media type
    fn supports(&self, media_type: &str) -> bool;

    /// Open a fresh stream over the resource, positioned at the header row
    fn open(&self, resource: &Resource) -> Result<RowStream, RowSourceError>;

    /// Short name used in logs (e.g., "csv")
    fn source_type(&self) -> &str;
}
