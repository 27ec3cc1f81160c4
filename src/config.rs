//! Importer settings
//!
//! Read from the environment (a `.env` file is honored by the binary):
//! - IMPORTER_DATABASE: SQLite file holding imported tables
//! - IMPORTER_STATE_DIR: directory of persisted import job documents
//! - IMPORTER_TIME_LIMIT: seconds per pass, unset for no limit

use crate::error::{ImportError, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATABASE: &str = "datastore.sqlite";
pub const DEFAULT_STATE_DIR: &str = ".import-jobs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub state_dir: PathBuf,
    pub time_limit_seconds: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            time_limit_seconds: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let time_limit_seconds = match get("IMPORTER_TIME_LIMIT") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ImportError::Configuration(format!("IMPORTER_TIME_LIMIT={} is not a number of seconds: {}", raw, e))
            })?),
            None => defaults.time_limit_seconds,
        };

        Ok(Self {
            database: get("IMPORTER_DATABASE").map(PathBuf::from).unwrap_or(defaults.database),
            state_dir: get("IMPORTER_STATE_DIR").map(PathBuf::from).unwrap_or(defaults.state_dir),
            time_limit_seconds,
        })
    }
}
