pub mod game;
pub mod session;
pub mod state_machine;
pub mod timer;
pub mod transitions;

use std::sync::{Arc, PoisonError};

use tokio::{
    sync::{Mutex, MutexGuard, RwLock},
    task::JoinHandle,
};
use tracing::warn;

use crate::{
    cache::{CacheStats, QuestionCache, SharedCache},
    config::EngineConfig,
    dao::snapshot_store::SnapshotStore,
    error::ServiceError,
    generator::{QuestionGenerationClient, QuestionService},
};

pub use self::session::{SessionSnapshot, SessionStateStore};
pub use self::state_machine::{AbortError, ApplyError, GameEvent, GamePhase, Plan, PlanError, PlanId};
use self::timer::QuestionTimer;

/// Context handle shared by handlers and background tasks.
pub type SharedContext = Arc<SessionContext>;

/// Everything a session operation needs: the cache, the session store, snapshot storage,
/// the question countdown and the reentrancy gate.
pub struct SessionContext {
    config: EngineConfig,
    client: QuestionGenerationClient,
    cache: SharedCache,
    session: RwLock<SessionStateStore>,
    snapshots: Arc<dyn SnapshotStore>,
    timer: QuestionTimer,
    operation_gate: Mutex<()>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Construct a new [`SessionContext`] wrapped in an [`Arc`] so background tasks can
    /// hold it.
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn QuestionService>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> SharedContext {
        let client = QuestionGenerationClient::new(service, config.language());
        let cache = QuestionCache::new(client.clone(), config.cache().clone());
        let session = SessionStateStore::new(config.board().clone());

        Arc::new(Self {
            config,
            client,
            cache,
            session: RwLock::new(session),
            snapshots,
            timer: QuestionTimer::new(),
            operation_gate: Mutex::new(()),
            sweeper: std::sync::Mutex::new(None),
        })
    }

    /// Engine configuration loaded at startup.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Client for question generation and grading.
    pub fn client(&self) -> &QuestionGenerationClient {
        &self.client
    }

    /// Question cache.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Session store. Only session operations holding the gate write to it; the countdown
    /// task refreshes the time left.
    pub fn session(&self) -> &RwLock<SessionStateStore> {
        &self.session
    }

    /// Storage the session snapshot is persisted to.
    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    /// Countdown of the active question.
    pub fn timer(&self) -> &QuestionTimer {
        &self.timer
    }

    /// Enter the operation gate, failing immediately if another operation holds it.
    pub fn try_begin_operation(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.operation_gate
            .try_lock()
            .map_err(|_| ServiceError::OperationInProgress)
    }

    /// Enter the operation gate, waiting for the current holder.
    pub async fn begin_operation(&self) -> MutexGuard<'_, ()> {
        self.operation_gate.lock().await
    }

    /// Start the periodic cache eviction sweep. Replaces a previously started sweeper.
    pub fn start_sweeper(&self) {
        let handle = self.cache.spawn_sweeper();
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Owned copy of the current session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.snapshot()
    }

    /// Current cache contents.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Plan `event`, run `work`, then apply the transition and hand the work's output to
    /// `commit` under the same write lock. The plan is aborted when `work` fails.
    ///
    /// Callers must hold the operation gate.
    pub async fn run_transition<W, Fut, T, C, R>(
        &self,
        event: GameEvent,
        work: W,
        commit: C,
    ) -> Result<R, ServiceError>
    where
        W: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServiceError>>,
        C: FnOnce(&mut SessionStateStore, T) -> R,
    {
        let Plan { id: plan_id, .. } = self.session.write().await.plan(event.clone())?;

        match work().await {
            Ok(value) => {
                let mut session = self.session.write().await;
                if let Err(err) = session.apply(plan_id) {
                    let _ = session.abort(plan_id);
                    return Err(err.into());
                }
                Ok(commit(&mut session, value))
            }
            Err(err) => {
                if let Err(abort_err) = self.session.write().await.abort(plan_id) {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                Err(err)
            }
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        let slot = self.sweeper.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
