use tracing::{debug, warn};

use crate::{
    dao::{
        snapshot_store::{write_final_snapshot, write_snapshot},
        storage::SnapshotError,
    },
    error::ServiceError,
    state::{SessionSnapshot, SessionStateStore, SharedContext, state_machine::GameEvent},
};

/// Execute a planned state-machine transition, then persist the resulting snapshot.
pub async fn run_transition_with_persist<W, Fut, T, C, R>(
    context: &SharedContext,
    event: GameEvent,
    work: W,
    commit: C,
) -> Result<R, ServiceError>
where
    W: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
    C: FnOnce(&mut SessionStateStore, T) -> R,
{
    let result = context.run_transition(event, work, commit).await?;
    let snapshot = context.snapshot().await;
    persist_snapshot(context, &snapshot).await;
    Ok(result)
}

/// Write the snapshot to storage. The transition is already committed, so failures are
/// only logged.
pub async fn persist_snapshot(context: &SharedContext, snapshot: &SessionSnapshot) {
    let result = write_snapshot(context.snapshots(), snapshot).await;
    log_persist(result, snapshot);
}

/// Write the last snapshot of an ended session, flagged so it is never restored.
pub async fn persist_final_snapshot(context: &SharedContext, snapshot: &SessionSnapshot) {
    let result = write_final_snapshot(context.snapshots(), snapshot).await;
    log_persist(result, snapshot);
}

fn log_persist(result: Result<(), SnapshotError>, snapshot: &SessionSnapshot) {
    match result {
        Ok(()) => debug!(phase = ?snapshot.phase, "session snapshot persisted"),
        Err(err) => warn!(
            phase = ?snapshot.phase,
            error = %err,
            "failed to persist session snapshot"
        ),
    }
}
