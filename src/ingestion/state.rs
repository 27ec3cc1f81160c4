//! Portable import task document
//!
//! Everything a later process needs to continue an import, minus the live
//! collaborators, which are named by reference and resolved again on load.

use crate::error::{ImportError, Result};
use crate::ingestion::Status;
use serde::{Deserialize, Serialize};

/// Status tag as written to the document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Stopped,
    InProgress,
    Done,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportState {
    pub resource_id: String,
    pub resource_location: String,
    pub resource_media_type: String,
    pub storage_config_ref: String,
    pub row_source_config_ref: String,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    pub status: StatusKind,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub cursor: u64,
}

impl ImportState {
    /// Rebuild the status, rejecting a message without an error or an
    /// error without a message.
    pub fn status(&self) -> Result<Status> {
        match (self.status, &self.error_message) {
            (StatusKind::Error, Some(message)) => Ok(Status::Error(message.clone())),
            (StatusKind::Error, None) => Err(ImportError::State(
                "status is error but errorMessage is missing".to_string(),
            )),
            (_, Some(_)) => Err(ImportError::State(format!(
                "errorMessage is only allowed with status error, found {:?}",
                self.status
            ))),
            (StatusKind::Stopped, None) => Ok(Status::Stopped),
            (StatusKind::InProgress, None) => Ok(Status::InProgress),
            (StatusKind::Done, None) => Ok(Status::Done),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
