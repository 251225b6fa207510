//! Session worker: a single-writer actor hosting one session's machine.
//!
//! Each worker owns its [`SessionMachine`] exclusively and drains a bounded
//! `mpsc` mailbox one command at a time, so guard evaluation never races.
//! An accepted transition is persisted, broadcast, and handed to the
//! observer list before the caller gets its reply. Stop requests and idle
//! reaping are only observed between commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::catalog::SessionBlueprint;
use crate::models::action::SessionAction;
use crate::models::snapshot::Snapshot;
use crate::orchestrator::broadcaster::StateBroadcaster;
use crate::orchestrator::machine::SessionMachine;
use crate::orchestrator::observer::{SessionObserver, TransitionEvent};
use crate::persistence::snapshot_repo::SnapshotStore;
use crate::{AppError, Result};

/// Shared collaborators handed to every worker.
#[derive(Clone)]
pub struct WorkerDeps {
    /// Durable snapshot store.
    pub store: Arc<dyn SnapshotStore>,
    /// Snapshot fan-out.
    pub broadcaster: Arc<StateBroadcaster>,
    /// Observers, invoked in order after each accepted transition.
    pub observers: Arc<[Arc<dyn SessionObserver>]>,
    /// Bounded mailbox size.
    pub mailbox_capacity: usize,
    /// Stop after this long without commands; `None` keeps workers alive.
    pub idle_timeout: Option<Duration>,
}

enum WorkerCommand {
    Dispatch {
        action: SessionAction,
        reply: oneshot::Sender<Result<Snapshot>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Cloneable handle to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    session_id: Arc<str>,
    process_id: Arc<str>,
    tx: mpsc::Sender<WorkerCommand>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("session_id", &self.session_id)
            .field("process_id", &self.process_id)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl WorkerHandle {
    /// Session hosted by this worker.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Identifier assigned by the process manager.
    #[must_use]
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Whether the worker still accepts commands. A stopping worker reports
    /// `false` while it may still be finishing its current command; await
    /// [`stopped`](Self::stopped) before replacing it.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && !self.finished.is_cancelled() && !self.tx.is_closed()
    }

    /// Apply `action` and return the resulting snapshot (unchanged for a
    /// rejected action).
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkerStopped` if the worker stopped before it
    /// processed the action, or the store error if persisting failed.
    ///
    /// The reply sender is only dropped for commands the worker never
    /// started, so `WorkerStopped` always means the action was not applied
    /// and may be re-sent to a successor.
    pub async fn dispatch(&self, action: SessionAction) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::Dispatch { action, reply })
            .await
            .map_err(|_| self.stopped_error())?;
        rx.await.map_err(|_| self.stopped_error())?
    }

    /// Current in-memory snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkerStopped` if the worker is gone.
    pub async fn current_snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerCommand::Snapshot { reply })
            .await
            .map_err(|_| self.stopped_error())?;
        rx.await.map_err(|_| self.stopped_error())
    }

    /// Ask the worker to stop after the command it is processing, if any.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Resolve once the worker loop has exited.
    pub async fn stopped(&self) {
        self.finished.cancelled().await;
    }

    fn stopped_error(&self) -> AppError {
        AppError::WorkerStopped(format!("worker for session {} is not running", self.session_id))
    }
}

/// The actor itself; created through [`SessionWorker::start`].
pub struct SessionWorker {
    session_id: String,
    machine: SessionMachine,
    deps: WorkerDeps,
}

impl SessionWorker {
    /// Start a worker for `blueprint`, resuming from the snapshot store when
    /// a snapshot exists and starting in `waiting` otherwise.
    ///
    /// # Errors
    ///
    /// Returns the store error if the snapshot lookup fails, or
    /// `AppError::Catalog` if the stored state is not part of the plan.
    pub async fn start(
        blueprint: SessionBlueprint,
        deps: WorkerDeps,
        process_id: String,
    ) -> Result<WorkerHandle> {
        let session_id = blueprint.session_id.clone();
        let span = info_span!("session_worker", session_id = %session_id, process_id = %process_id);

        let machine = match deps.store.get(&session_id).await? {
            Some(snapshot) => {
                let version = snapshot.version;
                let machine = SessionMachine::from_snapshot(Arc::clone(&blueprint.plan), snapshot)?;
                info!(parent: &span, version, state = %machine.snapshot().value, "resumed from snapshot");
                machine
            }
            None => {
                debug!(parent: &span, "no snapshot; starting in waiting");
                SessionMachine::new(
                    Arc::clone(&blueprint.plan),
                    blueprint.required_active_profile_count,
                )
            }
        };

        let (tx, rx) = mpsc::channel(deps.mailbox_capacity.max(1));
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let worker = Self {
            session_id: session_id.clone(),
            machine,
            deps,
        };
        tokio::spawn(
            worker
                .run(rx, cancel.clone(), finished.clone())
                .instrument(span),
        );

        Ok(WorkerHandle {
            session_id: Arc::from(session_id),
            process_id: Arc::from(process_id),
            tx,
            cancel,
            finished,
        })
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<WorkerCommand>,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) {
        info!("session worker started");
        let idle_timeout = self.deps.idle_timeout;

        loop {
            let command = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("stop requested");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                () = idle(idle_timeout) => {
                    info!(?idle_timeout, "worker idle; stopping");
                    break;
                }
            };

            match command {
                WorkerCommand::Dispatch { action, reply } => {
                    let result = self.dispatch(&action).await;
                    let _ = reply.send(result);
                }
                WorkerCommand::Snapshot { reply } => {
                    let _ = reply.send(self.machine.snapshot());
                }
            }
        }

        // Pending commands are dropped unprocessed; their callers observe
        // `WorkerStopped`.
        rx.close();
        cancel.cancel();
        finished.cancel();
        info!(version = self.machine.version(), "session worker stopped");
    }

    async fn dispatch(&mut self, action: &SessionAction) -> Result<Snapshot> {
        let Some(next) = self.machine.step(action, Utc::now().timestamp_millis()) else {
            debug!(
                action = action.name(),
                profile_id = action.profile_id(),
                "action rejected"
            );
            return Ok(self.machine.snapshot());
        };

        let snapshot = next.snapshot();
        if let Err(err) = self.deps.store.put(&self.session_id, &snapshot).await {
            warn!(%err, version = snapshot.version, "failed to persist snapshot; transition discarded");
            return Err(err);
        }

        let previous_state = self.machine.state().path(self.machine.plan());
        self.machine = next;

        self.deps
            .broadcaster
            .publish(&self.session_id, &snapshot)
            .await;

        let event = TransitionEvent {
            session_id: &self.session_id,
            action,
            previous_state: &previous_state,
            snapshot: &snapshot,
        };
        for observer in self.deps.observers.iter() {
            observer.on_transition(&event);
        }

        Ok(snapshot)
    }
}

async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
