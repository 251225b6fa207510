//! Integration tests for `SessionSupervisor` find-or-start and lifecycle.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use workshop_conductor::config::WorkerConfig;
use workshop_conductor::models::action::SessionAction;
use workshop_conductor::models::snapshot::Snapshot;
use workshop_conductor::orchestrator::broadcaster::StateBroadcaster;
use workshop_conductor::orchestrator::process_manager::{
    process_name_for, ProcessManager, StartRequest,
};
use workshop_conductor::orchestrator::supervisor::SessionSupervisor;
use workshop_conductor::persistence::session_repo::SessionRepo;
use workshop_conductor::persistence::snapshot_repo::SnapshotStore;
use workshop_conductor::AppError;

use super::test_helpers::{
    blueprint, catalog, harness, harness_over, memory_db, FailingProcessManager, GatedStore,
    Harness, SESSION,
};

fn join(p: &str) -> SessionAction {
    SessionAction::Join {
        profile_id: p.into(),
    }
}

fn active(snapshot: &Snapshot) -> Vec<&str> {
    snapshot
        .context
        .current_active_profiles
        .iter()
        .map(String::as_str)
        .collect()
}

async fn gated_harness() -> (Harness, Arc<GatedStore>) {
    let db = memory_db().await;
    let store = Arc::new(GatedStore::new(Arc::clone(&db)));
    let h = harness_over(2, None, db, Arc::clone(&store) as Arc<dyn SnapshotStore>);
    (h, store)
}

#[tokio::test]
async fn concurrent_find_or_start_yields_one_worker() {
    let h = harness(2).await;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let supervisor = Arc::clone(&h.supervisor);
            tokio::spawn(async move { supervisor.find_or_start(SESSION).await })
        })
        .collect();

    let mut process_ids = Vec::new();
    let mut started = 0;
    for task in tasks {
        let (handle, is_new) = task.await.expect("join").expect("find_or_start");
        if is_new {
            started += 1;
        }
        process_ids.push(handle.process_id().to_owned());
    }

    assert_eq!(started, 1, "exactly one start");
    process_ids.dedup();
    assert_eq!(process_ids.len(), 1, "every caller got the same worker");

    let processes = h.process_manager.list().await;
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].name, process_name_for(SESSION));
    assert_eq!(processes[0].script_ref, "session-worker");
    assert!(processes[0].running);
}

#[tokio::test]
async fn starting_records_the_session() {
    let h = harness(2).await;
    h.supervisor.find_or_start(SESSION).await.expect("start");

    let record = h
        .sessions
        .get_by_id(SESSION)
        .await
        .expect("get")
        .expect("recorded");
    assert_eq!(record.workshop_id, "retro");
    assert_eq!(record.required_active_profile_count, 2);
    assert_eq!(h.supervisor.running_sessions().await, vec![SESSION.to_owned()]);
}

#[tokio::test]
async fn unknown_session_is_unresolvable() {
    let h = harness(2).await;
    let err = h
        .supervisor
        .find_or_start("ghost")
        .await
        .expect_err("not in catalog");
    assert!(matches!(err, AppError::UnresolvableSession(_)));
    assert!(h.process_manager.list().await.is_empty());
}

#[tokio::test]
async fn process_manager_failure_is_surfaced_without_retry() {
    let db = memory_db().await;
    let pm = Arc::new(FailingProcessManager::default());
    let supervisor = SessionSupervisor::new(
        Arc::new(catalog(2)),
        Arc::clone(&pm) as Arc<dyn ProcessManager>,
        SessionRepo::new(Arc::clone(&db)),
        Arc::new(StateBroadcaster::new(8)),
        WorkerConfig::default(),
    );

    let err = supervisor
        .find_or_start(SESSION)
        .await
        .expect_err("start fails");
    assert!(matches!(err, AppError::ProcessManager(_)));
    assert!(err.is_infrastructure());
    assert_eq!(pm.starts.load(Ordering::SeqCst), 1, "no retry");

    let sessions = SessionRepo::new(db);
    assert!(sessions.get_by_id(SESSION).await.expect("get").is_none());
}

#[tokio::test]
async fn find_never_starts() {
    let h = harness(2).await;
    assert!(h.supervisor.find(SESSION).await.expect("find").is_none());
    assert!(h.process_manager.list().await.is_empty());
}

#[tokio::test]
async fn stop_keeps_snapshot_for_later_recovery() {
    let h = harness(2).await;
    h.gateway.join(SESSION, "p1").await.expect("join");

    h.supervisor.stop(SESSION).await.expect("stop");
    assert!(h.supervisor.find(SESSION).await.expect("find").is_none());
    assert!(h.supervisor.running_sessions().await.is_empty());

    let snapshot = h.gateway.join(SESSION, "p2").await.expect("restart");
    assert_eq!(snapshot.version, 2);
    assert!(snapshot.context.current_active_profiles.contains("p1"));
    assert!(snapshot.context.current_active_profiles.contains("p2"));
}

#[tokio::test]
async fn delete_stops_worker_marks_record_and_closes_channel() {
    let h = harness(2).await;
    h.gateway.join(SESSION, "p1").await.expect("join");
    let mut rx = h.gateway.subscribe(SESSION).await;

    assert!(h.supervisor.delete(SESSION).await.expect("delete"));

    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    assert!(h.process_manager.list().await.is_empty());
    let record = h
        .sessions
        .get_by_id(SESSION)
        .await
        .expect("get")
        .expect("record");
    assert!(record.is_deleted());

    let err = h
        .supervisor
        .find_or_start(SESSION)
        .await
        .expect_err("deleted sessions stay unresolvable");
    assert!(matches!(err, AppError::UnresolvableSession(_)));
    assert!(h.process_manager.list().await.is_empty());
}

#[tokio::test]
async fn stop_during_inflight_dispatch_keeps_a_single_writer() {
    let (h, store) = gated_harness().await;
    h.gateway.join(SESSION, "p1").await.expect("join");

    store.hold_next_put.store(true, Ordering::SeqCst);
    let gateway = h.gateway.clone();
    let join_p2 = tokio::spawn(async move { gateway.join(SESSION, "p2").await });
    store.entered.notified().await;

    let supervisor = Arc::clone(&h.supervisor);
    let stop = tokio::spawn(async move { supervisor.stop(SESSION).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let supervisor = Arc::clone(&h.supervisor);
    let restart = tokio::spawn(async move { supervisor.find_or_start(SESSION).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        !restart.is_finished(),
        "no successor while the old worker is mid-transition"
    );

    store.release.notify_one();
    let acknowledged = join_p2.await.expect("task").expect("join p2");
    assert_eq!(acknowledged.version, 2);
    stop.await.expect("task").expect("stop");

    let (handle, is_new) = restart.await.expect("task").expect("restart");
    assert!(is_new);
    let snapshot = handle.dispatch(join("p3")).await.expect("join p3");
    assert_eq!(snapshot.version, 3);
    assert_eq!(active(&snapshot), vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn process_manager_waits_for_stopping_worker_before_replacing_it() {
    let (h, store) = gated_harness().await;
    let (old, _) = h.supervisor.find_or_start(SESSION).await.expect("start");
    old.dispatch(join("p1")).await.expect("join");

    store.hold_next_put.store(true, Ordering::SeqCst);
    let inflight = {
        let old = old.clone();
        tokio::spawn(async move { old.dispatch(join("p2")).await })
    };
    store.entered.notified().await;
    old.stop();
    assert!(!old.is_alive());

    let process_manager = Arc::clone(&h.process_manager);
    let blueprint = blueprint(2).await;
    let replacement = tokio::spawn(async move {
        process_manager
            .start(StartRequest {
                script_ref: "session-worker".into(),
                process_name: process_name_for(SESSION),
                args: Vec::new(),
                blueprint,
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!replacement.is_finished());

    store.release.notify_one();
    assert_eq!(inflight.await.expect("task").expect("p2").version, 2);

    let started = replacement.await.expect("task").expect("start");
    assert!(started.is_new);
    let resumed = started.handle.current_snapshot().await.expect("snapshot");
    assert_eq!(resumed.version, 2);
    assert_eq!(active(&resumed), vec!["p1", "p2"]);
}

#[tokio::test]
async fn delete_during_inflight_dispatch_completes_it_then_rejects() {
    let (h, store) = gated_harness().await;
    h.gateway.join(SESSION, "p1").await.expect("join");

    store.hold_next_put.store(true, Ordering::SeqCst);
    let gateway = h.gateway.clone();
    let join_p2 = tokio::spawn(async move { gateway.join(SESSION, "p2").await });
    store.entered.notified().await;

    let supervisor = Arc::clone(&h.supervisor);
    let delete = tokio::spawn(async move { supervisor.delete(SESSION).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!delete.is_finished(), "delete waits for the worker to exit");

    store.release.notify_one();
    assert_eq!(join_p2.await.expect("task").expect("join p2").version, 2);
    assert!(delete.await.expect("task").expect("delete"));

    let err = h.gateway.join(SESSION, "p3").await.expect_err("deleted");
    assert!(matches!(err, AppError::UnresolvableSession(_)));
    let stored = h.store.get(SESSION).await.expect("get").expect("kept");
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn delete_unknown_session_reports_false() {
    let h = harness(2).await;
    assert!(!h.supervisor.delete("ghost").await.expect("delete"));
}

#[tokio::test]
async fn shutdown_stops_every_worker() {
    let h = harness(2).await;
    let (handle, _) = h.supervisor.find_or_start(SESSION).await.expect("start");

    h.supervisor.shutdown().await;

    handle.stopped().await;
    assert!(!handle.is_alive());
    assert!(h.supervisor.running_sessions().await.is_empty());
}
