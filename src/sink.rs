//! CSV output file with a fixed column schema.
//!
//! A batch is serialized into memory first and lands in the file with a single
//! append. If that append fails the file is cut back to its previous length, so
//! a batch is either fully present or not present at all.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::entity::Record;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    columns: Vec<String>,
}

impl CsvSink {
    pub fn new<I, S>(path: impl Into<PathBuf>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Creates or truncates the file and writes only the header row. Destroys any
    /// data already collected, so only call this when the checkpoint is 0.
    pub async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        let header = into_bytes(writer)?;

        let mut file = File::create(&self.path).await?;
        file.write_all(&header).await?;
        file.sync_all().await?;
        debug!(path = ?self.path, columns = self.columns.len(), "Sink initialized");
        Ok(())
    }

    /// Appends one row per record, in order. Keys outside the schema are ignored and
    /// missing columns are left empty.
    ///
    /// Returns the file length before the batch, for [`CsvSink::rollback_to`].
    pub async fn append_batch(&self, records: &[Record]) -> Result<u64> {
        let buf = self.render_rows(records)?;
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        append_or_rollback(&mut file, &self.path, &buf).await
    }

    /// Cuts the file back to `len` bytes, dropping a batch whose checkpoint never
    /// landed.
    pub async fn rollback_to(&self, len: u64) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.truncate_to(len).await?;
        debug!(path = ?self.path, len, "Sink rolled back");
        Ok(())
    }

    /// Checks the existing file's header against the declared columns.
    pub async fn verify_header(&self) -> Result<()> {
        let path = self.path.clone();
        let found = spawn_blocking(move || -> Result<Vec<String>> {
            let mut reader = csv::Reader::from_path(&path)?;
            Ok(reader.headers()?.iter().map(str::to_string).collect())
        })
        .await??;

        if found != self.columns {
            return Err(Error::SchemaMismatch {
                path: self.path.clone(),
                expected: self.columns.clone(),
                found,
            });
        }
        Ok(())
    }

    /// Number of data rows, header excluded.
    pub async fn row_count(&self) -> Result<usize> {
        let path = self.path.clone();
        spawn_blocking(move || -> Result<usize> {
            let mut reader = csv::Reader::from_path(&path)?;
            let mut count = 0;
            for row in reader.records() {
                row?;
                count += 1;
            }
            Ok(count)
        })
        .await?
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    fn render_rows(&self, records: &[Record]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            let row = self
                .columns
                .iter()
                .map(|column| record.get(column).map(render_cell).unwrap_or_default());
            writer.write_record(row)?;
        }
        into_bytes(writer)
    }
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))
}

/// Strings go in raw, null becomes an empty cell, everything else is compact JSON.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The file operations a batch append needs.
#[async_trait]
trait BatchFile: Send {
    async fn end(&mut self) -> io::Result<u64>;
    async fn write_synced(&mut self, buf: &[u8]) -> io::Result<()>;
    async fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

#[async_trait]
impl BatchFile for File {
    async fn end(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0)).await
    }

    async fn write_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf).await?;
        self.sync_all().await
    }

    async fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await?;
        self.sync_all().await
    }
}

/// Writes `buf` at the end of `file`. On failure the file is cut back to where it
/// ended before, so a partial batch never stays behind.
async fn append_or_rollback<F: BatchFile>(file: &mut F, path: &Path, buf: &[u8]) -> Result<u64> {
    let committed_len = file.end().await?;
    if let Err(e) = file.write_synced(buf).await {
        warn!(path = ?path, error = %e, "Batch write failed, rolling back");
        if let Err(rollback) = file.truncate_to(committed_len).await {
            warn!(path = ?path, error = %rollback, "Rollback failed");
        }
        return Err(e.into());
    }
    Ok(committed_len)
}
