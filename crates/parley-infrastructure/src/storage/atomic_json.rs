//! Atomic JSON file operations.
//!
//! Writes go to a hidden temp file in the same directory, are fsynced, then
//! renamed over the target, so a reader sees either the old or the new
//! document and never a partial one. Every write gets its own temp file.

use parley_core::{ParleyError, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A handle to a JSON document written with tmp file + fsync + rename.
///
/// No file locking is performed; concurrent writers never share a temp
/// file, and the last rename wins.
#[derive(Debug, Clone)]
pub struct AtomicJsonFile<T> {
    path: PathBuf,
    _phantom: PhantomData<fn() -> T>,
}

/// Outcome of reading an [`AtomicJsonFile`] without deserializing.
#[derive(Debug)]
pub enum RawRead {
    Missing,
    Empty,
    Bytes(Vec<u8>),
}

impl<T> AtomicJsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw bytes, distinguishing a missing file from an empty one.
    pub async fn read_raw(&self) -> Result<RawRead> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(RawRead::Empty),
            Ok(bytes) => Ok(RawRead::Bytes(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RawRead::Missing),
            Err(e) => Err(ParleyError::storage_io("read", self.path.display().to_string(), e)),
        }
    }

    /// Loads and deserializes the document.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err(CorruptRecord)`: The file exists but is not a valid `T`
    pub async fn load(&self) -> Result<Option<T>> {
        match self.read_raw().await? {
            RawRead::Missing | RawRead::Empty => Ok(None),
            RawRead::Bytes(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ParleyError::corrupt(self.path.display().to_string(), e.to_string())),
        }
    }

    /// Serializes `data` and replaces the file atomically.
    pub async fn save(&self, data: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        self.write_bytes(&json).await
    }

    /// Replaces the file atomically with `bytes`.
    pub async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let target = self.path.display().to_string();
        let io_err = |e: std::io::Error| ParleyError::storage_io("write", target.clone(), e);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp_path = self.temp_path()?;
        let result = async {
            let mut tmp_file = File::create(&tmp_path).await?;
            tmp_file.write_all(bytes).await?;
            tmp_file.sync_all().await?;
            drop(tmp_file);
            fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            // Best effort: the target is untouched, only the temp file may remain
            let _ = fs::remove_file(&tmp_path).await;
            return Err(io_err(e));
        }
        Ok(())
    }

    /// Deletes the file. Returns whether it existed.
    pub async fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ParleyError::storage_io(
                "delete",
                self.path.display().to_string(),
                e,
            )),
        }
    }

    fn temp_path(&self) -> Result<PathBuf> {
        let file_name = self.path.file_name().ok_or_else(|| {
            ParleyError::invalid_argument(format!("Path has no file name: {}", self.path.display()))
        })?;
        let tmp_name = format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        );
        Ok(self.path.with_file_name(tmp_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::task::JoinSet;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestDoc {
        name: String,
        count: u32,
    }

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicJsonFile::<TestDoc>::new(temp_dir.path().join("nested/doc.json"));

        let doc = TestDoc {
            name: "test".to_string(),
            count: 42,
        };
        file.save(&doc).await.unwrap();

        assert_eq!(file.load().await.unwrap(), Some(doc));
        // No temp file left behind
        assert!(temp_files(&temp_dir.path().join("nested")).is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicJsonFile::<TestDoc>::new(temp_dir.path().join("doc.json"));
        assert!(file.load().await.unwrap().is_none());

        std::fs::write(file.path(), "  \n").unwrap();
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicJsonFile::<TestDoc>::new(temp_dir.path().join("doc.json"));
        std::fs::write(file.path(), "{ not json").unwrap();

        let err = file.load().await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_failed_write_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory at the target makes the rename fail
        let target = temp_dir.path().join("doc.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        let file = AtomicJsonFile::<TestDoc>::new(&target);
        let err = file
            .save(&TestDoc {
                name: "new".to_string(),
                count: 2,
            })
            .await
            .unwrap_err();

        assert!(err.is_storage_io());
        assert!(target.join("keep").exists());
        assert!(temp_files(temp_dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_do_not_collide() {
        let temp_dir = TempDir::new().unwrap();
        let file = Arc::new(AtomicJsonFile::<TestDoc>::new(temp_dir.path().join("doc.json")));

        let mut writers = JoinSet::new();
        for count in 0..32 {
            let file = file.clone();
            writers.spawn(async move {
                file.save(&TestDoc {
                    name: format!("writer {count}"),
                    count,
                })
                .await
            });
        }
        while let Some(result) = writers.join_next().await {
            result.unwrap().unwrap();
        }

        let doc = file.load().await.unwrap().unwrap();
        assert_eq!(doc.name, format!("writer {}", doc.count));
        assert!(temp_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicJsonFile::<TestDoc>::new(temp_dir.path().join("doc.json"));
        assert!(!file.remove().await.unwrap());

        file.save(&TestDoc {
            name: "x".to_string(),
            count: 0,
        })
        .await
        .unwrap();
        assert!(file.remove().await.unwrap());
        assert!(!file.path().exists());
    }
}
