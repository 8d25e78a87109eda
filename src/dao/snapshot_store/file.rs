use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::fs;
use tracing::debug;

use crate::dao::{
    snapshot_store::SnapshotStore,
    storage::{StorageError, StorageResult},
};

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Clone, Debug)]
pub struct FileSnapshotStore {
    dir: Arc<PathBuf>,
}

impl FileSnapshotStore {
    /// Store snapshots as JSON files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    /// Directory the snapshots are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let key = key.to_string();
        let path = self.path_for(&key);
        Box::pin(async move {
            match fs::read_to_string(&path).await {
                Ok(payload) => Ok(Some(payload)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(StorageError::unavailable(
                    key,
                    format!("failed to read `{}`", path.display()),
                    err,
                )),
            }
        })
    }

    fn save(&self, key: &str, payload: String) -> BoxFuture<'static, StorageResult<()>> {
        let key = key.to_string();
        let dir = Arc::clone(&self.dir);
        let path = self.path_for(&key);
        Box::pin(async move {
            fs::create_dir_all(dir.as_path()).await.map_err(|err| {
                StorageError::unavailable(
                    key.clone(),
                    format!("failed to create `{}`", dir.display()),
                    err,
                )
            })?;

            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, payload.as_bytes()).await.map_err(|err| {
                StorageError::unavailable(
                    key.clone(),
                    format!("failed to write `{}`", tmp.display()),
                    err,
                )
            })?;
            fs::rename(&tmp, &path).await.map_err(|err| {
                StorageError::unavailable(
                    key.clone(),
                    format!("failed to move snapshot into `{}`", path.display()),
                    err,
                )
            })?;

            debug!(path = %path.display(), bytes = payload.len(), "snapshot written");
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let key = key.to_string();
        let path = self.path_for(&key);
        Box::pin(async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(StorageError::unavailable(
                    key,
                    format!("failed to remove `{}`", path.display()),
                    err,
                )),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let dir = Arc::clone(&self.dir);
        Box::pin(async move {
            fs::create_dir_all(dir.as_path()).await.map_err(|err| {
                StorageError::unavailable(
                    dir.display().to_string(),
                    "snapshot directory is not writable",
                    err,
                )
            })
        })
    }
}
