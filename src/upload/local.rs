//! Local file fallback
//!
//! Last-resort save of a recording to the user's machine when the network
//! tiers failed and someone is there to find the file.

use crate::recorder::MediaBlob;
use crate::staging::{extension_for_mime, recording_filename};
use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Client-side save mechanism
#[async_trait]
pub trait LocalSaver: Send + Sync {
    /// Write the blob somewhere the user can find it and return the path
    async fn save(&self, blob: &MediaBlob) -> std::io::Result<PathBuf>;
}

/// Saves recordings as `<prefix>_<timestamp>.<ext>` in a downloads directory
#[derive(Debug, Clone)]
pub struct DownloadDirSaver {
    dir: PathBuf,
    prefix: String,
}

impl DownloadDirSaver {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LocalSaver for DownloadDirSaver {
    async fn save(&self, blob: &MediaBlob) -> std::io::Result<PathBuf> {
        let filename = recording_filename(&self.prefix, Utc::now(), extension_for_mime(&blob.mime_type));
        let dir = self.dir.clone();
        let data = blob.data.clone();

        let path = tokio::task::spawn_blocking(move || write_unique(&dir, &filename, &data))
            .await
            .map_err(std::io::Error::other)??;

        tracing::warn!("Saved recording locally to {:?}", path);
        Ok(path)
    }
}

/// Write without clobbering an existing download, suffixing `_1`, `_2`, ...
fn write_unique(dir: &Path, filename: &str, data: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let target = Path::new(filename);
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording")
        .to_string();
    let ext = target
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("webm")
        .to_string();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    let mut candidate = dir.join(filename);
    let mut counter = 0;
    loop {
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                counter += 1;
                candidate = dir.join(format!("{}_{}.{}", stem, counter, ext));
            }
            Err(e) => return Err(e.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_writes_named_file() {
        let dir = tempdir().unwrap();
        let saver = DownloadDirSaver::new(dir.path(), "session");
        let blob = MediaBlob::new(vec![3u8; 12], "video/webm;codecs=vp8");

        let path = saver.save(&blob).await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("session_"));
        assert!(name.ends_with(".webm"));
        assert_eq!(std::fs::read(&path).unwrap().len(), 12);
    }

    #[test]
    fn test_write_unique_does_not_clobber() {
        let dir = tempdir().unwrap();
        let first = write_unique(dir.path(), "session_1.webm", b"a").unwrap();
        let second = write_unique(dir.path(), "session_1.webm", b"b").unwrap();

        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "session_1_1.webm");
        assert_eq!(std::fs::read(&first).unwrap(), b"a");
    }
}
