/// Snapshot storage on the local filesystem.
pub mod file;
/// Process-local snapshot storage.
pub mod memory;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{SNAPSHOT_KEY, decode_document, encode_final_snapshot, encode_snapshot},
        storage::{SnapshotError, StorageResult},
    },
    state::session::SessionSnapshot,
};

/// Abstraction over the key-value storage holding the session snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Fetch the payload stored under `key`, `None` when nothing is stored.
    fn load(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;
    /// Store `payload` under `key`, replacing any previous value.
    fn save(&self, key: &str, payload: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the payload stored under `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// Verify the backend is reachable and writable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Serialize and store the snapshot under the fixed session key.
pub async fn write_snapshot(
    store: &dyn SnapshotStore,
    snapshot: &SessionSnapshot,
) -> Result<(), SnapshotError> {
    let payload = encode_snapshot(snapshot)?;
    store.save(SNAPSHOT_KEY, payload).await?;
    Ok(())
}

/// Store the last snapshot of an ended session. [`read_snapshot`] skips it.
pub async fn write_final_snapshot(
    store: &dyn SnapshotStore,
    snapshot: &SessionSnapshot,
) -> Result<(), SnapshotError> {
    let payload = encode_final_snapshot(snapshot)?;
    store.save(SNAPSHOT_KEY, payload).await?;
    Ok(())
}

/// Load the stored snapshot. A missing record or the record of an ended session is
/// `Ok(None)`; an unreadable one is [`SnapshotError::Corrupt`].
pub async fn read_snapshot(
    store: &dyn SnapshotStore,
) -> Result<Option<SessionSnapshot>, SnapshotError> {
    let Some(payload) = store.load(SNAPSHOT_KEY).await? else {
        return Ok(None);
    };
    let decoded = decode_document(&payload).and_then(|doc| {
        if doc.is_complete {
            debug!("stored snapshot belongs to an ended session");
            return Ok(None);
        }
        SessionSnapshot::try_from(doc).map(Some)
    });
    match decoded {
        Ok(snapshot) => Ok(snapshot),
        Err(err) => {
            warn!(error = %err, "stored snapshot rejected");
            Err(err)
        }
    }
}

/// Delete the stored snapshot, if any.
pub async fn clear_snapshot(store: &dyn SnapshotStore) -> Result<(), SnapshotError> {
    store.remove(SNAPSHOT_KEY).await?;
    Ok(())
}
