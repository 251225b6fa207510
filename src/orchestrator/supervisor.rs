//! Session supervisor: maps session ids to running workers.
//!
//! At most one worker runs per session. Start attempts are serialized on
//! the worker table and the process manager is always asked to find the
//! named worker before starting a new one. Stop and delete keep the table
//! locked until the worker has exited. Deleted sessions are never started
//! again. Failures are surfaced to the caller as-is; nothing here retries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::catalog::ActivityCatalog;
use crate::config::WorkerConfig;
use crate::orchestrator::broadcaster::StateBroadcaster;
use crate::orchestrator::process_manager::{process_name_for, ProcessManager, StartRequest};
use crate::orchestrator::worker::WorkerHandle;
use crate::persistence::session_repo::SessionRepo;
use crate::{AppError, Result};

/// Owns the `session id → worker` table.
pub struct SessionSupervisor {
    catalog: Arc<dyn ActivityCatalog>,
    process_manager: Arc<dyn ProcessManager>,
    sessions: SessionRepo,
    broadcaster: Arc<StateBroadcaster>,
    worker: WorkerConfig,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl SessionSupervisor {
    /// Create a supervisor with an empty worker table.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ActivityCatalog>,
        process_manager: Arc<dyn ProcessManager>,
        sessions: SessionRepo,
        broadcaster: Arc<StateBroadcaster>,
        worker: WorkerConfig,
    ) -> Self {
        Self {
            catalog,
            process_manager,
            sessions,
            broadcaster,
            worker,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the running worker for `session_id`, starting one if needed.
    ///
    /// The flag is `true` when this call started the worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnresolvableSession` if the session was deleted or
    /// the catalog does not know it, or the process manager / registry error
    /// otherwise.
    pub async fn find_or_start(&self, session_id: &str) -> Result<(WorkerHandle, bool)> {
        let span = info_span!("find_or_start", session_id);
        self.find_or_start_inner(session_id).instrument(span).await
    }

    async fn find_or_start_inner(&self, session_id: &str) -> Result<(WorkerHandle, bool)> {
        let mut workers = self.workers.lock().await;

        if let Some(handle) = workers.get(session_id) {
            if handle.is_alive() {
                return Ok((handle.clone(), false));
            }
            debug!("dropping stale worker handle");
            workers.remove(session_id);
        }

        let process_name = process_name_for(session_id);
        if let Some(handle) = self.process_manager.find(&process_name).await? {
            debug!(process_id = handle.process_id(), "adopted running worker");
            workers.insert(session_id.to_owned(), handle.clone());
            return Ok((handle, false));
        }

        if self
            .sessions
            .get_by_id(session_id)
            .await?
            .is_some_and(|record| record.is_deleted())
        {
            return Err(AppError::UnresolvableSession(format!(
                "session '{session_id}' was deleted"
            )));
        }

        let blueprint = self.catalog.blueprint(session_id).await?.ok_or_else(|| {
            AppError::UnresolvableSession(format!("session '{session_id}' is not in the catalog"))
        })?;

        let started = self
            .process_manager
            .start(StartRequest {
                script_ref: self.worker.script_ref.clone(),
                process_name,
                args: self.worker.args.clone(),
                blueprint: blueprint.clone(),
            })
            .await
            .inspect_err(|err| warn!(%err, "worker start failed"))?;

        if started.is_new {
            self.sessions.record_started(&blueprint).await?;
            info!(
                process_id = started.process_id,
                workshop_id = %blueprint.workshop_id,
                "session worker started"
            );
        }

        workers.insert(session_id.to_owned(), started.handle.clone());
        Ok((started.handle, started.is_new))
    }

    /// Running worker for `session_id`, if any; never starts one.
    ///
    /// # Errors
    ///
    /// Returns the process manager error if the lookup fails.
    pub async fn find(&self, session_id: &str) -> Result<Option<WorkerHandle>> {
        let mut workers = self.workers.lock().await;

        if let Some(handle) = workers.get(session_id) {
            if handle.is_alive() {
                return Ok(Some(handle.clone()));
            }
            workers.remove(session_id);
        }

        let found = self
            .process_manager
            .find(&process_name_for(session_id))
            .await?;
        if let Some(handle) = &found {
            workers.insert(session_id.to_owned(), handle.clone());
        }
        Ok(found)
    }

    /// Stop the worker for `session_id`. The snapshot survives, so a later
    /// action resumes where the session left off.
    ///
    /// # Errors
    ///
    /// Returns the process manager error if the stop fails.
    pub async fn stop(&self, session_id: &str) -> Result<()> {
        let mut workers = self.workers.lock().await;
        workers.remove(session_id);
        // Held until the worker has exited so no replacement can start
        // while it finishes an in-flight transition.
        self.process_manager
            .stop(&process_name_for(session_id))
            .await?;
        drop(workers);
        info!(session_id, "session worker stopped");
        Ok(())
    }

    /// Stop and unregister the worker, mark the session deleted, and close
    /// its broadcast channel. The session id is unresolvable from then on.
    /// Returns `false` if no live session record existed.
    ///
    /// # Errors
    ///
    /// Returns the process manager or registry error.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let mut workers = self.workers.lock().await;
        workers.remove(session_id);
        self.process_manager
            .delete(&process_name_for(session_id))
            .await?;
        let existed = self.sessions.mark_deleted(session_id).await?;
        drop(workers);
        self.broadcaster.close(session_id).await;
        info!(session_id, existed, "session deleted");
        Ok(existed)
    }

    /// Ids of sessions with a live worker, sorted.
    pub async fn running_sessions(&self) -> Vec<String> {
        let workers = self.workers.lock().await;
        let mut ids: Vec<String> = workers
            .iter()
            .filter(|(_, handle)| handle.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop every known worker. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        let drained: Vec<String> = workers.drain().map(|(id, _)| id).collect();
        for session_id in drained {
            if let Err(err) = self
                .process_manager
                .stop(&process_name_for(&session_id))
                .await
            {
                warn!(session_id, %err, "failed to stop worker during shutdown");
            }
        }
        info!("supervisor shut down");
    }
}
