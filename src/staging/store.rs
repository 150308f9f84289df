//! Durable staging store
//!
//! Holds finalized recordings until the ingestion service confirms them.
//! The store outlives the process: a recording staged before a crash is
//! found again by the next `list_all`.
//!
//! On disk each entry is two files in the staging directory:
//! - `<id>.bin`: the raw media bytes
//! - `<id>.json`: the `StagedRecord` (id, MIME type, size, metadata)
//!
//! Both are written to a temp file and renamed into place, data first, so an
//! entry only becomes visible once it is complete.
//!
//! Several processes may share one directory. A data file without a record
//! may be another instance's save in progress, so `open` only sweeps such
//! files once they are older than a grace period. A record without its data
//! file can never be completed and is removed at once.

use super::schema::{RecordingMetadata, StagedRecord, StagedRecording};
use crate::recorder::MediaBlob;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

const DATA_EXTENSION: &str = "bin";
const RECORD_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".staging-";

/// Age after which an unpaired data file or temp file counts as abandoned
pub const ORPHAN_GRACE: Duration = Duration::from_secs(60 * 60);

/// Staging-related errors
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Staged recording not found: {0}")]
    NotFound(String),

    #[error("Failed to persist staged recording: {0}")]
    Persist(String),
}

/// Result type alias for staging operations
pub type StagingResult<T> = Result<T, StagingError>;

/// Persistent key-value store of undelivered recordings
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Durably store a recording and return its id
    async fn save(&self, blob: &MediaBlob, metadata: &RecordingMetadata) -> StagingResult<String>;

    /// Every staged recording, in no particular order
    async fn list_all(&self) -> StagingResult<Vec<StagedRecording>>;

    /// Load one staged recording
    async fn get(&self, id: &str) -> StagingResult<StagedRecording>;

    /// Remove an entry. Deleting a missing id succeeds.
    async fn delete(&self, id: &str) -> StagingResult<()>;
}

/// Directory-backed staging store
#[derive(Debug, Clone)]
pub struct FileStagingStore {
    dir: PathBuf,
}

impl FileStagingStore {
    /// Open (creating if needed) the store rooted at `dir`
    ///
    /// Removes leftovers from a crash mid-save: records whose data is gone,
    /// plus temp files and data files whose record was never written once
    /// they are older than `ORPHAN_GRACE`.
    pub async fn open(dir: impl Into<PathBuf>) -> StagingResult<Self> {
        Self::open_with_grace(dir, ORPHAN_GRACE).await
    }

    /// Like `open`, with a custom age before unpaired files are swept
    pub async fn open_with_grace(dir: impl Into<PathBuf>, grace: Duration) -> StagingResult<Self> {
        let dir = dir.into();
        let store = Self { dir };
        let sweep_dir = store.dir.clone();
        tokio::task::spawn_blocking(move || -> StagingResult<()> {
            std::fs::create_dir_all(&sweep_dir)?;
            sweep_incomplete(&sweep_dir, grace)
        })
        .await
        .map_err(|e| StagingError::Persist(e.to_string()))??;

        tracing::debug!("Opened staging store at {:?}", store.dir);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, DATA_EXTENSION))
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    async fn read_entry(&self, record_path: PathBuf) -> StagingResult<StagedRecording> {
        let content = tokio::fs::read_to_string(&record_path).await?;
        let record: StagedRecord = serde_json::from_str(&content)?;
        let data = match tokio::fs::read(self.data_path(&record.id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StagingError::NotFound(record.id));
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() as u64 != record.size_bytes {
            tracing::warn!(
                "Staged recording {} has {} bytes, record says {}",
                record.id,
                data.len(),
                record.size_bytes
            );
        }

        Ok(StagedRecording {
            id: record.id,
            blob: MediaBlob::new(data, record.mime_type),
            metadata: record.metadata,
        })
    }
}

#[async_trait]
impl StagingStore for FileStagingStore {
    async fn save(&self, blob: &MediaBlob, metadata: &RecordingMetadata) -> StagingResult<String> {
        let id = Uuid::new_v4().to_string();
        let record = StagedRecord {
            id: id.clone(),
            mime_type: blob.mime_type.clone(),
            size_bytes: blob.len() as u64,
            metadata: metadata.clone(),
        };
        let record_json = serde_json::to_vec_pretty(&record)?;

        let dir = self.dir.clone();
        let data = blob.data.clone();
        let data_path = self.data_path(&id);
        let record_path = self.record_path(&id);

        tokio::task::spawn_blocking(move || -> StagingResult<()> {
            write_atomic(&dir, &data_path, &data)?;
            write_atomic(&dir, &record_path, &record_json)
        })
        .await
        .map_err(|e| StagingError::Persist(e.to_string()))??;

        tracing::info!(
            "Staged recording {} ({} bytes, {})",
            id,
            blob.len(),
            metadata.filename
        );
        Ok(id)
    }

    async fn list_all(&self) -> StagingResult<Vec<StagedRecording>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut staged = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match self.read_entry(path.clone()).await {
                Ok(recording) => staged.push(recording),
                Err(e) => {
                    tracing::warn!("Skipping unreadable staged entry {:?}: {}", path, e);
                }
            }
        }

        Ok(staged)
    }

    async fn get(&self, id: &str) -> StagingResult<StagedRecording> {
        let record_path = self.record_path(id);
        if !tokio::fs::try_exists(&record_path).await? {
            return Err(StagingError::NotFound(id.to_string()));
        }
        self.read_entry(record_path).await
    }

    async fn delete(&self, id: &str) -> StagingResult<()> {
        // Record first, so a crash in between leaves an orphan that `open` sweeps.
        remove_if_exists(&self.record_path(id)).await?;
        remove_if_exists(&self.data_path(id)).await?;
        tracing::debug!("Removed staged recording {}", id);
        Ok(())
    }
}

fn is_record_file(path: &Path) -> bool {
    let is_temp = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TEMP_PREFIX))
        .unwrap_or(true);
    !is_temp && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
}

async fn remove_if_exists(path: &Path) -> StagingResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> StagingResult<()> {
    let mut tmp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)
        .map_err(|e| StagingError::Persist(e.error.to_string()))?;
    Ok(())
}

fn sweep_incomplete(dir: &Path, grace: Duration) -> StagingResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let extension = path.extension().and_then(|e| e.to_str());

        let remove = if name.starts_with(TEMP_PREFIX) {
            is_abandoned(&entry, grace)
        } else if extension == Some(DATA_EXTENSION) {
            !path.with_extension(RECORD_EXTENSION).exists() && is_abandoned(&entry, grace)
        } else if extension == Some(RECORD_EXTENSION) {
            // Data is always persisted before its record.
            !path.with_extension(DATA_EXTENSION).exists()
        } else {
            false
        };

        if remove {
            tracing::warn!("Removing incomplete staging file {:?}", path);
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Could not remove {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}

/// Whether a file was last written at least `grace` ago
fn is_abandoned(entry: &std::fs::DirEntry, grace: Duration) -> bool {
    let modified = match entry.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            tracing::debug!("No mtime for {:?}: {}", entry.path(), e);
            return false;
        }
    };
    // A timestamp in the future reads as brand new.
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    age >= grace
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn blob(len: usize) -> MediaBlob {
        MediaBlob::new(vec![42u8; len], "video/webm;codecs=vp9")
    }

    fn metadata() -> RecordingMetadata {
        RecordingMetadata::new(Some("Trial_1"), Some("P001"), "video/webm")
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let dir = tempdir().unwrap();
        let store = FileStagingStore::open(dir.path()).await.unwrap();

        let id = store.save(&blob(450), &metadata()).await.unwrap();
        let all = store.list_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].blob.len(), 450);
        assert_eq!(all[0].blob.mime_type, "video/webm;codecs=vp9");
        assert_eq!(all[0].metadata.participant_id, "P001");
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileStagingStore::open(dir.path()).await.unwrap();
            store.save(&blob(10), &metadata()).await.unwrap()
        };

        let reopened = FileStagingStore::open(dir.path()).await.unwrap();
        let entry = reopened.get(&id).await.unwrap();
        assert_eq!(entry.blob.len(), 10);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStagingStore::open(dir.path()).await.unwrap();
        let id = store.save(&blob(5), &metadata()).await.unwrap();

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        store.delete("never-existed").await.unwrap();

        assert!(store.list_all().await.unwrap().is_empty());
        assert!(matches!(store.get(&id).await, Err(StagingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_multiple_entries_drained_independently() {
        let dir = tempdir().unwrap();
        let store = FileStagingStore::open(dir.path()).await.unwrap();
        let first = store.save(&blob(1), &metadata()).await.unwrap();
        let second = store.save(&blob(2), &metadata()).await.unwrap();

        store.delete(&first).await.unwrap();
        let remaining = store.list_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
    }

    fn backdate(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn test_open_sweeps_abandoned_files() {
        let dir = tempdir().unwrap();
        let orphan = dir.path().join("orphan.bin");
        let temp = dir.path().join(".staging-abc123");
        std::fs::write(&orphan, b"partial").unwrap();
        std::fs::write(&temp, b"tmp").unwrap();
        backdate(&orphan, ORPHAN_GRACE * 2);
        backdate(&temp, ORPHAN_GRACE * 2);

        let store = FileStagingStore::open(dir.path()).await.unwrap();

        assert!(!orphan.exists());
        assert!(!temp.exists());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_keeps_fresh_unpaired_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.bin"), b"partial").unwrap();
        std::fs::write(dir.path().join(".staging-def456"), b"tmp").unwrap();

        FileStagingStore::open(dir.path()).await.unwrap();

        assert!(dir.path().join("fresh.bin").exists());
        assert!(dir.path().join(".staging-def456").exists());
    }

    #[tokio::test]
    async fn test_open_between_data_and_record_writes_keeps_entry() {
        let dir = tempdir().unwrap();
        let writer = FileStagingStore::open(dir.path()).await.unwrap();
        let blob = blob(64);
        let record = StagedRecord {
            id: "inflight".to_string(),
            mime_type: blob.mime_type.clone(),
            size_bytes: blob.len() as u64,
            metadata: metadata(),
        };

        // The writer has persisted the data but not yet the record.
        write_atomic(dir.path(), &writer.data_path("inflight"), &blob.data).unwrap();
        let other = FileStagingStore::open(dir.path()).await.unwrap();
        write_atomic(
            dir.path(),
            &writer.record_path("inflight"),
            &serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();

        let listed = other.list_all().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "inflight");
        assert_eq!(listed[0].blob.len(), 64);
    }

    #[tokio::test]
    async fn test_open_removes_record_without_data() {
        let dir = tempdir().unwrap();
        let store = FileStagingStore::open(dir.path()).await.unwrap();
        let id = store.save(&blob(8), &metadata()).await.unwrap();
        std::fs::remove_file(store.data_path(&id)).unwrap();

        let reopened = FileStagingStore::open(dir.path()).await.unwrap();

        assert!(!reopened.record_path(&id).exists());
        assert!(reopened.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_grace_sweeps_everything_unpaired() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("orphan.bin"), b"partial").unwrap();

        FileStagingStore::open_with_grace(dir.path(), Duration::ZERO)
            .await
            .unwrap();

        assert!(!dir.path().join("orphan.bin").exists());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_records() {
        let dir = tempdir().unwrap();
        let store = FileStagingStore::open(dir.path()).await.unwrap();
        store.save(&blob(3), &metadata()).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
