//! Process manager contract and the in-process task implementation.
//!
//! The supervisor never spawns workers itself; it asks a [`ProcessManager`]
//! to start, find, stop, or delete a named worker. [`TaskProcessManager`]
//! hosts every worker as a tokio task in the current process, and like an
//! OS process manager it finds before it starts, so two racing starts for
//! the same name yield one worker. A replacement worker is only started
//! once the previous one has fully exited.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::catalog::SessionBlueprint;
use crate::orchestrator::worker::{SessionWorker, WorkerDeps, WorkerHandle};
use crate::Result;

/// Deterministic worker process name for a session.
#[must_use]
pub fn process_name_for(session_id: &str) -> String {
    format!("session-worker-{session_id}")
}

/// Everything needed to launch a session worker.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Entry point reference, e.g. a script path for OS-level managers.
    pub script_ref: String,
    /// Name from [`process_name_for`].
    pub process_name: String,
    /// Extra entry point arguments.
    pub args: Vec<String>,
    /// Session to host.
    pub blueprint: SessionBlueprint,
}

/// Outcome of [`ProcessManager::start`].
#[derive(Debug, Clone)]
pub struct StartedWorker {
    /// `false` when a worker with that name was already running.
    pub is_new: bool,
    /// Identifier assigned by the manager.
    pub process_id: String,
    /// Handle to the (new or existing) worker.
    pub handle: WorkerHandle,
}

/// Bookkeeping for one managed worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process name.
    pub name: String,
    /// Identifier assigned at start.
    pub process_id: String,
    /// Entry point reference it was started with.
    pub script_ref: String,
    /// Arguments it was started with.
    pub args: Vec<String>,
    /// Whether the worker is still running.
    pub running: bool,
}

/// External process lifecycle contract consumed by the supervisor.
pub trait ProcessManager: Send + Sync {
    /// Start the named worker unless one with that name is already running.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessManager` (or the worker's startup error) if
    /// the worker cannot be started.
    fn start(
        &self,
        request: StartRequest,
    ) -> Pin<Box<dyn Future<Output = Result<StartedWorker>> + Send + '_>>;

    /// Handle to the running worker with this name, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessManager` if the manager is unreachable.
    fn find<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WorkerHandle>>> + Send + 'a>>;

    /// Stop the named worker, keeping its registration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessManager` if the manager is unreachable.
    fn stop<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Stop the named worker and drop its registration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProcessManager` if the manager is unreachable.
    fn delete<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

#[derive(Debug)]
struct ManagedProcess {
    process_id: String,
    script_ref: String,
    args: Vec<String>,
    handle: WorkerHandle,
}

/// Hosts session workers as tokio tasks in this process.
pub struct TaskProcessManager {
    deps: WorkerDeps,
    processes: Mutex<HashMap<String, ManagedProcess>>,
}

impl TaskProcessManager {
    /// Create a manager that hands `deps` to every worker it starts.
    #[must_use]
    pub fn new(deps: WorkerDeps) -> Self {
        Self {
            deps,
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of every registered worker, sorted by name.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        let processes = self.processes.lock().await;
        let mut infos: Vec<ProcessInfo> = processes
            .iter()
            .map(|(name, process)| ProcessInfo {
                name: name.clone(),
                process_id: process.process_id.clone(),
                script_ref: process.script_ref.clone(),
                args: process.args.clone(),
                running: process.handle.is_alive(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    async fn start_worker(&self, request: StartRequest) -> Result<StartedWorker> {
        let mut processes = self.processes.lock().await;

        if let Some(existing) = processes.get(&request.process_name) {
            if existing.handle.is_alive() {
                return Ok(StartedWorker {
                    is_new: false,
                    process_id: existing.process_id.clone(),
                    handle: existing.handle.clone(),
                });
            }
            // A stopping worker may still be persisting its last transition;
            // its successor must resume from that snapshot.
            debug!(process_id = %existing.process_id, "waiting for previous worker to exit");
            existing.handle.stopped().await;
        }

        let process_id = Uuid::new_v4().to_string();
        let handle =
            SessionWorker::start(request.blueprint, self.deps.clone(), process_id.clone()).await?;

        info!(
            process_name = %request.process_name,
            process_id,
            script_ref = %request.script_ref,
            args = ?request.args,
            "worker process started"
        );

        processes.insert(
            request.process_name,
            ManagedProcess {
                process_id: process_id.clone(),
                script_ref: request.script_ref,
                args: request.args,
                handle: handle.clone(),
            },
        );

        Ok(StartedWorker {
            is_new: true,
            process_id,
            handle,
        })
    }

    async fn find_worker(&self, process_name: &str) -> Option<WorkerHandle> {
        let processes = self.processes.lock().await;
        processes
            .get(process_name)
            .map(|process| process.handle.clone())
            .filter(WorkerHandle::is_alive)
    }

    async fn stop_worker(&self, process_name: &str) {
        let handle = {
            let processes = self.processes.lock().await;
            processes.get(process_name).map(|p| p.handle.clone())
        };
        if let Some(handle) = handle {
            handle.stop();
            handle.stopped().await;
            info!(process_name, "worker process stopped");
        }
    }

    async fn delete_worker(&self, process_name: &str) {
        let removed = self.processes.lock().await.remove(process_name);
        if let Some(process) = removed {
            process.handle.stop();
            process.handle.stopped().await;
            info!(process_name, "worker process deleted");
        }
    }
}

impl ProcessManager for TaskProcessManager {
    fn start(
        &self,
        request: StartRequest,
    ) -> Pin<Box<dyn Future<Output = Result<StartedWorker>> + Send + '_>> {
        let span = info_span!("process_start", process_name = %request.process_name);
        Box::pin(self.start_worker(request).instrument(span))
    }

    fn find<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WorkerHandle>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.find_worker(process_name).await) })
    }

    fn stop<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.stop_worker(process_name).await;
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        process_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.delete_worker(process_name).await;
            Ok(())
        })
    }
}
