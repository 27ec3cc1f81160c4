//! CSV Row Source - Streams delimited text files row by row

use crate::ingestion::connector::{RowSourceError, RowSourceFactory, RowStream};
use crate::ingestion::Resource;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{Cursor, ErrorKind, Read};
use std::path::PathBuf;
use tracing::debug;

/// Bytes inspected up front to reject binary or non UTF-8 content
pub const DEFAULT_SNIFF_BYTES: usize = 8 * 1024;

const UTF8_BOM: char = '\u{feff}';

/// Options for the CSV row source
#[derive(Clone, Debug)]
pub struct CsvOptions {
    /// Field delimiter. `None` picks one from the media type.
    pub delimiter: Option<u8>,
    pub quote: u8,
    /// Trim surrounding whitespace from every field
    pub trim: bool,
    pub sniff_bytes: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            trim: false,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
        }
    }
}

/// CSV Row Source Factory - opens local delimited files.
///
/// The reader is header-less and flexible: the header comes back as the first
/// row and ragged rows are passed through for the importer to judge.
#[derive(Clone, Debug, Default)]
pub struct CsvRowSourceFactory {
    options: CsvOptions,
}

impl CsvRowSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CsvOptions) -> Self {
        Self { options }
    }

    fn delimiter_for(&self, essence: &str) -> Option<u8> {
        let by_type = match essence {
            "text/csv" | "application/csv" | "text/plain" => Some(b','),
            "text/tab-separated-values" => Some(b'\t'),
            _ => None,
        };
        by_type.map(|default| self.options.delimiter.unwrap_or(default))
    }

    fn resolve_path(location: &str) -> Result<PathBuf, RowSourceError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(RowSourceError::Unreadable {
                location: location.to_string(),
                reason: "remote locations must be fetched before import".to_string(),
            });
        }
        Ok(PathBuf::from(location.strip_prefix("file://").unwrap_or(location)))
    }

    /// Read the leading bytes and reject content that is not text.
    fn sniff(&self, location: &str, file: &mut File) -> Result<Vec<u8>, RowSourceError> {
        let mut prefix = Vec::with_capacity(self.options.sniff_bytes);
        file.by_ref()
            .take(self.options.sniff_bytes as u64)
            .read_to_end(&mut prefix)
            .map_err(|e| RowSourceError::Unreadable {
                location: location.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(pos) = prefix.iter().position(|b| *b == 0) {
            return Err(RowSourceError::InvalidContent(format!(
                "binary content detected at byte {}",
                pos
            )));
        }

        if let Err(e) = std::str::from_utf8(&prefix) {
            // A multi-byte character cut by the sniff window is fine
            let cut_at_window = e.error_len().is_none() && prefix.len() == self.options.sniff_bytes;
            if !cut_at_window {
                return Err(RowSourceError::InvalidContent(format!(
                    "not valid UTF-8 text after byte {}",
                    e.valid_up_to()
                )));
            }
        }

        Ok(prefix)
    }
}

fn classify_csv_error(location: &str, err: csv::Error) -> RowSourceError {
    match err.kind() {
        csv::ErrorKind::Utf8 { pos, .. } => RowSourceError::InvalidContent(format!(
            "record {} is not valid UTF-8 text",
            pos.as_ref().map(|p| p.record()).unwrap_or(0)
        )),
        csv::ErrorKind::Io(e) => RowSourceError::Unreadable {
            location: location.to_string(),
            reason: e.to_string(),
        },
        _ => RowSourceError::InvalidContent(err.to_string()),
    }
}

impl RowSourceFactory for CsvRowSourceFactory {
    fn supports(&self, media_type: &str) -> bool {
        let essence = media_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        self.delimiter_for(&essence).is_some()
    }

    fn open(&self, resource: &Resource) -> Result<RowStream, RowSourceError> {
        let location = resource.location().to_string();
        let delimiter = self.delimiter_for(&resource.essence()).ok_or_else(|| {
            RowSourceError::InvalidContent(format!(
                "media type {} is not delimited text",
                resource.media_type()
            ))
        })?;

        let path = Self::resolve_path(&location)?;
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RowSourceError::NotFound {
                    location: location.clone(),
                    source: e,
                }
            } else {
                RowSourceError::Unreadable {
                    location: location.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let prefix = self.sniff(&location, &mut file)?;
        debug!("Opened {} ({} bytes sniffed)", location, prefix.len());

        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .quote(self.options.quote)
            .trim(if self.options.trim { csv::Trim::All } else { csv::Trim::None })
            .from_reader(Cursor::new(prefix).chain(file));

        let mut at_header = true;
        let rows = reader.into_records().map(move |record| {
            let record = record.map_err(|e| classify_csv_error(&location, e))?;
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();
            if at_header {
                at_header = false;
                if let Some(first) = fields.first_mut() {
                    if first.starts_with(UTF8_BOM) {
                        *first = first.trim_start_matches(UTF8_BOM).to_string();
                    }
                }
            }
            Ok(fields)
        });

        Ok(Box::new(rows))
    }

    fn source_type(&self) -> &str {
        "csv"
    }
}
