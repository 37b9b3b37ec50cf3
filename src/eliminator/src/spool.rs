//! Destroy-candidate spool handed from classification to deletion.
//!
//! One JSON document per line, in scroll order, so that deeper units always
//! precede their ancestors.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

use crate::model::Unit;
use crate::outcome::Result;

pub const SPOOL_FILE_NAME: &str = "units_to_delete.jsonl";

/// Spool location of an operation under `workspace_dir`.
pub fn spool_path(workspace_dir: &Path, operation_id: &str) -> PathBuf {
    workspace_dir.join(operation_id).join(SPOOL_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolRecord {
    pub id: String,
    /// Ordering key, deepest first
    pub depth: u32,
    pub unit: Unit,
}

impl From<&Unit> for SpoolRecord {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id.clone(),
            depth: unit.depth,
            unit: unit.clone(),
        }
    }
}

/// A completed spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spool {
    pub path: PathBuf,
    pub count: u64,
}

pub struct SpoolWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

impl SpoolWriter {
    /// Create (or truncate) the spool of an operation.
    pub async fn create(workspace_dir: &Path, operation_id: &str) -> Result<Self> {
        let path = spool_path(workspace_dir, operation_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let file = File::create(&path).await?;
        tracing::debug!(path = %path.display(), "Created destroy-candidate spool");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            count: 0,
        })
    }

    pub async fn append(&mut self, record: &SpoolRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush and sync to disk.
    pub async fn finish(mut self) -> Result<Spool> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok(Spool {
            path: self.path,
            count: self.count,
        })
    }
}

/// Remove the spool of an operation and its directory. Absent files are ignored.
pub async fn remove_spool(workspace_dir: &Path, operation_id: &str) -> Result<()> {
    let path = spool_path(workspace_dir, operation_id);
    ignore_not_found(fs::remove_file(&path).await)?;
    if let Some(dir) = path.parent() {
        ignore_not_found(fs::remove_dir(dir).await)?;
    }
    tracing::debug!(path = %path.display(), "Removed destroy-candidate spool");
    Ok(())
}

fn ignore_not_found(result: std::io::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

pub struct SpoolReader {
    lines: Lines<BufReader<File>>,
}

impl SpoolReader {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    /// Up to `size` records, or `None` at end of spool.
    pub async fn next_batch(&mut self, size: usize) -> Result<Option<Vec<SpoolRecord>>> {
        let mut batch = Vec::with_capacity(size);
        while batch.len() < size.max(1) {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => batch.push(serde_json::from_str(&line)?),
                None => break,
            }
        }
        Ok((!batch.is_empty()).then_some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{EliminationError, StatusCode};

    #[tokio::test]
    async fn test_write_then_read_in_batches() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut writer = SpoolWriter::create(dir.path(), "op-1").await.unwrap();
        for (id, depth) in [("c", 3), ("b", 2), ("a", 1)] {
            writer
                .append(&SpoolRecord::from(&Unit::new(id, depth)))
                .await
                .unwrap();
        }
        let spool = writer.finish().await.unwrap();

        assert_eq!(spool.count, 3);
        assert_eq!(spool.path, dir.path().join("op-1").join(SPOOL_FILE_NAME));

        let mut reader = SpoolReader::open(&spool.path).await.unwrap();
        let first = reader.next_batch(2).await.unwrap().unwrap();
        assert_eq!(
            first.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "b"]
        );
        let second = reader.next_batch(2).await.unwrap().unwrap();
        assert_eq!(second[0].unit.id, "a");
        assert!(reader.next_batch(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_spool() {
        let dir = tempfile::TempDir::new().unwrap();
        let spool = SpoolWriter::create(dir.path(), "op-2")
            .await
            .unwrap()
            .finish()
            .await
            .unwrap();

        let mut reader = SpoolReader::open(&spool.path).await.unwrap();
        assert!(reader.next_batch(10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_spool_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let error = match SpoolReader::open(&spool_path(dir.path(), "missing")).await {
            Err(e) => e,
            Ok(_) => panic!("spool should not exist"),
        };
        assert!(matches!(error, EliminationError::Spool(_)));
        assert_eq!(error.status(), StatusCode::Fatal);
    }

    #[tokio::test]
    async fn test_remove_spool_cleans_operation_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let spool = SpoolWriter::create(dir.path(), "op-4")
            .await
            .unwrap()
            .finish()
            .await
            .unwrap();

        remove_spool(dir.path(), "op-4").await.unwrap();
        assert!(!spool.path.exists());
        assert!(!dir.path().join("op-4").exists());
        assert!(dir.path().exists());

        remove_spool(dir.path(), "op-4").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_line_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = spool_path(dir.path(), "op-3");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"{not json}\n").await.unwrap();

        let mut reader = SpoolReader::open(&path).await.unwrap();
        assert!(matches!(
            reader.next_batch(5).await,
            Err(EliminationError::Serialization(_))
        ));
    }
}
