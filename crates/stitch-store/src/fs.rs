//! Local filesystem blob store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::traits::{BlobMeta, BlobReader, BlobStore, BlobWriter};
use crate::validate_key;

/// One regular file per key under a single root directory.
///
/// Every write goes to a hidden temp file next to its target, is fsynced,
/// then renamed over the final name, so readers never see a torn blob.
/// Hidden entries are skipped by [`BlobStore::list`].
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.tmp.{}", Uuid::now_v7()))
    }
}

/// Map `NotFound` to `None`, propagate everything else.
fn optional<T>(result: std::io::Result<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn meta_from(key: String, md: &std::fs::Metadata) -> BlobMeta {
    let modified = md
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    BlobMeta {
        key,
        size: md.len(),
        modified,
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, data), fields(backend = "fs", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<u64> {
        let path = self.path_for(key)?;
        let temp = self.temp_path_for(key);

        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(temp = %temp.display(), error = %cleanup, "failed to remove temp file");
                }
            }
            return Err(e.into());
        }

        let size = fs::metadata(&path).await?.len();
        debug!(key, size, "blob written");
        Ok(size)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.path_for(key)?;
        Ok(optional(fs::read(&path).await)?.map(Bytes::from))
    }

    async fn open(&self, key: &str) -> StoreResult<Option<BlobReader>> {
        let path = self.path_for(key)?;
        Ok(optional(fs::File::open(&path).await)?.map(|f| Box::pin(f) as BlobReader))
    }

    async fn stat(&self, key: &str) -> StoreResult<Option<BlobMeta>> {
        let path = self.path_for(key)?;
        let md = optional(fs::metadata(&path).await)?;
        Ok(md
            .filter(|md| md.is_file())
            .map(|md| meta_from(key.to_string(), &md)))
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        Ok(optional(fs::remove_file(&path).await)?.is_some())
    }

    async fn list(&self) -> StoreResult<Vec<BlobMeta>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            // Entries can vanish between read_dir and metadata.
            let Some(md) = optional(entry.metadata().await)? else {
                continue;
            };
            if md.is_file() {
                out.push(meta_from(name, &md));
            }
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(backend = "fs"))]
    async fn put_stream(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        let final_path = self.path_for(key)?;
        let temp_path = self.temp_path_for(key);
        let file = fs::File::create(&temp_path).await?;
        Ok(Box::new(FsBlobWriter {
            file: Some(file),
            temp_path,
            final_path,
            written: 0,
            settled: false,
        }))
    }
}

/// Streaming write into a hidden temp file, renamed into place on finish.
///
/// A writer dropped before `finish` or `abort` (e.g. a cancelled merge)
/// removes its temp file.
struct FsBlobWriter {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    /// Set once the temp file has been renamed or removed.
    settled: bool,
}

impl FsBlobWriter {
    fn file(&mut self) -> std::io::Result<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("blob writer already closed"))
    }
}

#[async_trait]
impl BlobWriter for FsBlobWriter {
    async fn write(&mut self, data: Bytes) -> StoreResult<()> {
        self.file()?.write_all(&data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StoreResult<u64> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await?;
        self.file = None;
        // On error the temp file is removed by `Drop`.
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.settled = true;
        Ok(self.written)
    }

    async fn abort(mut self: Box<Self>) -> StoreResult<()> {
        self.file = None;
        optional(fs::remove_file(&self.temp_path).await)?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for FsBlobWriter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.file = None;
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => debug!(path = %self.temp_path.display(), "removed abandoned temp file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.temp_path.display(),
                error = %e,
                "failed to remove abandoned temp file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn open_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FsBlobStore::open(&nested).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_dir, store) = store().await;
        let size = store.put("abc-0", Bytes::from_static(b"hello world")).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(store.get("abc-0").await.unwrap().unwrap(), "hello world");
        assert_eq!(store.stat("abc-0").await.unwrap().unwrap().size, 11);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let (_dir, store) = store().await;
        store.put("k", Bytes::from_static(b"old")).await.unwrap();
        store.put("k", Bytes::from_static(b"newer")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "newer");
    }

    #[tokio::test]
    async fn put_leaves_no_temp_files() {
        let (dir, store) = store().await;
        store.put("k", Bytes::from_static(b"data")).await.unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let (_dir, store) = store().await;
        assert!(store.get("none").await.unwrap().is_none());
        assert!(store.stat("none").await.unwrap().is_none());
        assert!(store.open("none").await.unwrap().is_none());
        assert!(!store.delete("none").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (_dir, store) = store().await;
        assert!(store.put("../x", Bytes::from_static(b"x")).await.is_err());
        assert!(store.get("a/b").await.is_err());
    }

    #[tokio::test]
    async fn list_skips_hidden_and_dirs() {
        let (dir, store) = store().await;
        store.put("visible", Bytes::from_static(b"1")).await.unwrap();
        std::fs::write(dir.path().join(".visible.tmp.123"), b"partial").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let keys: Vec<String> = store.list().await.unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["visible".to_string()]);
    }

    #[tokio::test]
    async fn stream_visible_only_after_finish() {
        let (_dir, store) = store().await;
        let mut writer = store.put_stream("merged.bin").await.unwrap();
        writer.write(Bytes::from_static(b"part1-")).await.unwrap();
        writer.write(Bytes::from_static(b"part2")).await.unwrap();
        assert!(!store.exists("merged.bin").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());

        assert_eq!(writer.finish().await.unwrap(), 11);
        assert_eq!(store.get("merged.bin").await.unwrap().unwrap(), "part1-part2");
    }

    #[tokio::test]
    async fn abort_removes_temp() {
        let (dir, store) = store().await;
        let mut writer = store.put_stream("merged.bin").await.unwrap();
        writer.write(Bytes::from_static(b"partial")).await.unwrap();
        writer.abort().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dropped_writer_removes_temp() {
        let (dir, store) = store().await;
        let mut writer = store.put_stream("video.mp4").await.unwrap();
        writer.write(Bytes::from_static(b"half of it")).await.unwrap();
        drop(writer);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!store.exists("video.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn finished_writer_keeps_blob_after_drop() {
        let (dir, store) = store().await;
        let mut writer = store.put_stream("video.mp4").await.unwrap();
        writer.write(Bytes::from_static(b"whole")).await.unwrap();
        writer.finish().await.unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["video.mp4"]);
    }

    #[tokio::test]
    async fn open_reads_stream() {
        let (_dir, store) = store().await;
        store.put("f", Bytes::from_static(b"streamed")).await.unwrap();
        let mut reader = store.open("f").await.unwrap().unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "streamed");
    }
}
