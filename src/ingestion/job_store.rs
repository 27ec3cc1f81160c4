//! Job Store - persisted import task documents keyed by task identity
//!
//! Each pass of a long import may run in a different process. `ImportJob`
//! loads the task document for an identity, runs it, and writes the new
//! state back so the next pass picks up where this one stopped.

use crate::error::{ImportError, Result};
use crate::ingestion::{Collaborators, ImportConfig, ImportTask, Status};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

pub trait JobStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<String>>;

    fn save(&self, id: &str, state: &str) -> Result<()>;

    fn remove(&self, id: &str) -> Result<()>;
}

/// In-memory job store
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<String> {
        match self.jobs.read() {
            Ok(jobs) => jobs.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

fn poisoned() -> ImportError {
    ImportError::JobStore("job store lock poisoned".to_string())
}

impl JobStore for MemoryJobStore {
    fn load(&self, id: &str) -> Result<Option<String>> {
        Ok(self.jobs.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    fn save(&self, id: &str, state: &str) -> Result<()> {
        self.jobs
            .write()
            .map_err(|_| poisoned())?
            .insert(id.to_string(), state.to_string());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.jobs.write().map_err(|_| poisoned())?.remove(id);
        Ok(())
    }
}

/// One JSON document per job in a directory
#[derive(Clone, Debug)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids become file names; anything outside `[A-Za-z0-9_-]` is hex escaped
    fn path_for(&self, id: &str) -> PathBuf {
        let mut name = String::with_capacity(id.len());
        for byte in id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.dir.join(format!("{}.json", name))
    }
}

impl JobStore for FileJobStore {
    fn load(&self, id: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(id)) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, id: &str, state: &str) -> Result<()> {
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, state)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// An import task bound to its persisted document
pub struct ImportJob {
    id: String,
    jobs: Arc<dyn JobStore>,
    task: ImportTask,
}

impl ImportJob {
    /// Load the saved task for `id`, or create it from `config` and save it.
    ///
    /// A saved task keeps its own configuration; `config` only applies to a
    /// new job.
    pub fn get(
        id: &str,
        jobs: Arc<dyn JobStore>,
        config: ImportConfig,
        collaborators: &Collaborators,
    ) -> Result<Self> {
        if let Some(job) = Self::load(id, Arc::clone(&jobs), collaborators)? {
            return Ok(job);
        }

        let task = ImportTask::new(config, collaborators)?;
        let job = Self {
            id: id.to_string(),
            jobs,
            task,
        };
        job.save()?;
        debug!("Created import job {}", id);
        Ok(job)
    }

    /// Load the saved task for `id`, if there is one
    pub fn load(id: &str, jobs: Arc<dyn JobStore>, collaborators: &Collaborators) -> Result<Option<Self>> {
        let Some(json) = jobs.load(id)? else {
            return Ok(None);
        };
        let task = ImportTask::deserialize(&json, collaborators)?;
        debug!("Loaded import job {} at cursor {}", id, task.cursor());
        Ok(Some(Self {
            id: id.to_string(),
            jobs,
            task,
        }))
    }

    /// Run one pass and persist the resulting state
    pub fn run(&mut self) -> Result<Status> {
        let status = self.task.run().clone();
        self.save()?;
        Ok(status)
    }

    /// Drop imported data and persist the reset task
    pub fn drop_import(&mut self) -> Result<()> {
        self.task.drop_import()?;
        self.save()
    }

    /// Delete the persisted document; imported data is left alone
    pub fn forget(self) -> Result<()> {
        self.jobs.remove(&self.id)
    }

    pub fn save(&self) -> Result<()> {
        self.jobs.save(&self.id, &self.task.serialize()?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> &ImportTask {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut ImportTask {
        &mut self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryJobStore::new();
        assert!(store.load("1").unwrap().is_none());
        store.save("1", "{}").unwrap();
        assert_eq!(store.load("1").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.ids(), vec!["1".to_string()]);
        store.remove("1").unwrap();
        assert!(store.load("1").unwrap().is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path().join("jobs")).unwrap();
        store.save("a/b c", "{\"x\":1}").unwrap();
        assert_eq!(store.load("a/b c").unwrap().as_deref(), Some("{\"x\":1}"));
        assert!(store.load("a_b_c").unwrap().is_none());
        assert!(store.dir().join("a%2Fb%20c.json").exists());

        store.remove("a/b c").unwrap();
        store.remove("a/b c").unwrap();
        assert!(store.load("a/b c").unwrap().is_none());
    }
}
