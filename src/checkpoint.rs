//! Durable progress cursor: the number of app-list rows already written to a sink.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns 0 when no checkpoint has been written yet. A file that exists but
    /// doesn't hold a single non-negative integer is an error, never 0.
    pub async fn read(&self) -> Result<u64> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        raw.trim()
            .parse::<u64>()
            .map_err(|_| Error::CorruptCheckpoint {
                path: self.path.clone(),
                content: raw.clone(),
            })
    }

    /// Replaces the stored value. The new value is on disk when this returns: it is
    /// written to a sibling temp file, synced, then renamed over the old one.
    pub async fn write(&self, value: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        let mut file = File::create(&tmp).await?;
        file.write_all(format!("{value}\n").as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, value, "Checkpoint written");
        Ok(())
    }

    pub async fn reset(&self) -> Result<()> {
        self.write(0).await
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
