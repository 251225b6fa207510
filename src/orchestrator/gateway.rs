//! Action gateway: the entry point for every participant action.
//!
//! The gateway resolves the session's worker (starting it for a `join`),
//! forwards the action, and returns the resulting snapshot. Reads go to
//! the running worker when there is one and to the snapshot store
//! otherwise.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info_span, warn, Instrument};

use crate::models::action::SessionAction;
use crate::models::snapshot::Snapshot;
use crate::orchestrator::broadcaster::StateBroadcaster;
use crate::orchestrator::supervisor::SessionSupervisor;
use crate::orchestrator::worker::WorkerHandle;
use crate::persistence::snapshot_repo::SnapshotStore;
use crate::{AppError, Result};

/// Routes actions to session workers.
#[derive(Clone)]
pub struct ActionGateway {
    supervisor: Arc<SessionSupervisor>,
    store: Arc<dyn SnapshotStore>,
    broadcaster: Arc<StateBroadcaster>,
}

impl ActionGateway {
    /// Create a gateway over the given supervisor and stores.
    #[must_use]
    pub fn new(
        supervisor: Arc<SessionSupervisor>,
        store: Arc<dyn SnapshotStore>,
        broadcaster: Arc<StateBroadcaster>,
    ) -> Self {
        Self {
            supervisor,
            store,
            broadcaster,
        }
    }

    /// Add `profile_id` to the session's active profiles.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn join(&self, session_id: &str, profile_id: &str) -> Result<Snapshot> {
        self.dispatch(
            session_id,
            SessionAction::Join {
                profile_id: profile_id.to_owned(),
            },
        )
        .await
    }

    /// Remove `profile_id` from the session's active profiles.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn disconnect(&self, session_id: &str, profile_id: &str) -> Result<Snapshot> {
        self.dispatch(
            session_id,
            SessionAction::Disconnect {
                profile_id: profile_id.to_owned(),
            },
        )
        .await
    }

    /// Mark `profile_id` ready to start the workshop.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn ready_to_start(&self, session_id: &str, profile_id: &str) -> Result<Snapshot> {
        self.dispatch(
            session_id,
            SessionAction::ReadyToStart {
                profile_id: profile_id.to_owned(),
            },
        )
        .await
    }

    /// Record `profile_id`'s value for the current activity mode.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn set_activity_value(
        &self,
        session_id: &str,
        profile_id: &str,
        activity_id: &str,
        value: &str,
    ) -> Result<Snapshot> {
        self.dispatch(
            session_id,
            SessionAction::SetValue {
                profile_id: profile_id.to_owned(),
                activity_id: activity_id.to_owned(),
                value: value.to_owned(),
            },
        )
        .await
    }

    /// Mark `profile_id` ready in the current activity mode.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn set_activity_ready(
        &self,
        session_id: &str,
        profile_id: &str,
        activity_id: &str,
    ) -> Result<Snapshot> {
        self.dispatch(
            session_id,
            SessionAction::SetReady {
                profile_id: profile_id.to_owned(),
                activity_id: activity_id.to_owned(),
            },
        )
        .await
    }

    /// Forward `action` to the session's worker and return the resulting
    /// snapshot. A rejected action returns the unchanged snapshot.
    ///
    /// If the worker stopped before processing the action, the worker is
    /// resolved once more and the action re-sent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnresolvableSession` if the session cannot be
    /// hosted, or any infrastructure error from resolution or persistence.
    pub async fn dispatch(&self, session_id: &str, action: SessionAction) -> Result<Snapshot> {
        let span = info_span!(
            "dispatch",
            session_id,
            action = action.name(),
            profile_id = action.profile_id()
        );
        async move {
            let creating = action.is_creating();
            let handle = self.resolve(session_id, creating).await?;
            match handle.dispatch(action.clone()).await {
                Err(AppError::WorkerStopped(reason)) => {
                    warn!(%reason, "worker stopped before processing; resolving again");
                    let handle = self.resolve(session_id, creating).await?;
                    handle.dispatch(action).await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }

    /// Current snapshot of `session_id`; `None` if it never transitioned
    /// and no worker is running.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from the worker lookup or the store.
    pub async fn snapshot(&self, session_id: &str) -> Result<Option<Snapshot>> {
        if let Some(handle) = self.supervisor.find(session_id).await? {
            match handle.current_snapshot().await {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(AppError::WorkerStopped(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.store.get(session_id).await
    }

    /// Subscribe to future snapshots of `session_id`.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<Snapshot> {
        self.broadcaster.subscribe(session_id).await
    }

    /// Subscribe, then read the current snapshot. Live updates with a
    /// `version` at or below the returned snapshot's can be skipped.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub async fn watch(
        &self,
        session_id: &str,
    ) -> Result<(Option<Snapshot>, broadcast::Receiver<Snapshot>)> {
        let receiver = self.subscribe(session_id).await;
        let current = self.snapshot(session_id).await?;
        Ok((current, receiver))
    }

    /// Supervisor behind this gateway.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }

    async fn resolve(&self, session_id: &str, creating: bool) -> Result<WorkerHandle> {
        if creating {
            return self
                .supervisor
                .find_or_start(session_id)
                .await
                .map(|(handle, _)| handle);
        }

        if let Some(handle) = self.supervisor.find(session_id).await? {
            return Ok(handle);
        }
        if self.store.get(session_id).await?.is_none() {
            return Err(AppError::UnresolvableSession(format!(
                "session '{session_id}' has no running worker and no snapshot"
            )));
        }
        self.supervisor
            .find_or_start(session_id)
            .await
            .map(|(handle, _)| handle)
    }
}
