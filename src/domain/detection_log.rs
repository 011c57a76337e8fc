//! Detection log domain - the on-disk JSON array of detection events
//!
//! The file always holds one indent-formatted JSON array. Every append reads
//! the whole array, pushes the new event, and rewrites the file through a
//! temp file + rename. Appends are serialized by the store's own lock, so
//! concurrent connections in this process cannot lose each other's updates.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::DetectionEvent;

#[derive(Error, Debug)]
pub enum LogStoreError {
    #[error("detection log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("detection log is not a valid event array: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct DetectionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DetectionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with an empty array if it does not exist yet.
    /// Existing content is never touched.
    pub async fn initialize(&self) -> Result<(), LogStoreError> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        self.write_events(&[]).await
    }

    /// Append one event; returns the new length of the log
    pub async fn append(&self, event: &DetectionEvent) -> Result<usize, LogStoreError> {
        let _guard = self.lock.lock().await;

        let mut events = self.load().await?;
        events.push(event.clone());
        self.write_events(&events).await?;
        Ok(events.len())
    }

    /// Every persisted event, oldest first
    pub async fn read_all(&self) -> Result<Vec<DetectionEvent>, LogStoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn load(&self) -> Result<Vec<DetectionEvent>, LogStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_events(&self, events: &[DetectionEvent]) -> Result<(), LogStoreError> {
        let json = serde_json::to_vec_pretty(events)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("detection_log"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
