//! Lifecycle tests for the background-service runtime.

use std::time::Duration;

use telemetry_runtime::actor::{
    LifecycleError, Service, ServiceCore, ServiceSet, ServiceState, TaskOutcome,
};

#[tokio::test]
async fn stop_and_wait_with_zero_tasks_terminates() {
    let mut core = ServiceCore::new("empty");
    core.start().unwrap();
    core.stop().unwrap();

    let outcomes = tokio::time::timeout(Duration::from_secs(1), core.wait())
        .await
        .expect("wait() hung on an empty task set");
    assert!(outcomes.is_empty());
    assert_eq!(core.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let mut core = ServiceCore::new("repeat");
    core.start().unwrap();
    core.spawn("idle", |mut shutdown| async move {
        shutdown.recv().await;
        Ok(())
    });

    core.stop().unwrap();
    core.stop().unwrap();
    core.stop().unwrap();

    let outcomes = core.wait().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], TaskOutcome::Completed { .. }));
    assert_eq!(core.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn task_spawned_after_stop_still_observes_the_trigger() {
    let mut core = ServiceCore::new("late");
    core.start().unwrap();
    core.stop().unwrap();
    core.spawn("late-task", |mut shutdown| async move {
        shutdown.recv().await;
        Ok(())
    });

    let outcomes = tokio::time::timeout(Duration::from_secs(1), core.wait())
        .await
        .expect("late task never saw the sticky trigger");
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test]
async fn wait_reports_failures_instead_of_raising() {
    let mut core = ServiceCore::new("mixed");
    core.start().unwrap();
    core.spawn("ok", |mut shutdown| async move {
        shutdown.recv().await;
        Ok(())
    });
    core.spawn("broken", |_shutdown| async move {
        Err("sensor went away".into())
    });
    core.spawn("panicky", |_shutdown| async move {
        panic!("bad arithmetic");
    });

    // Give the failing tasks time to finish before stopping the healthy one.
    tokio::time::sleep(Duration::from_millis(50)).await;
    core.stop().unwrap();
    let outcomes = core.wait().await;

    assert_eq!(outcomes.len(), 3);
    let failed: Vec<_> = outcomes.iter().filter(|o| o.is_failure()).collect();
    assert_eq!(failed.len(), 2);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, TaskOutcome::Completed { task } if task.ends_with("/ok"))));
    assert!(outcomes.iter().any(
        |o| matches!(o, TaskOutcome::Failed { task, error } if task.ends_with("/panicky") && error.contains("bad arithmetic"))
    ));
    assert_eq!(core.state(), ServiceState::Crashed);
}

#[tokio::test]
async fn crash_in_one_service_leaves_siblings_running() {
    let mut healthy = ServiceCore::new("healthy");
    healthy.start().unwrap();
    healthy.spawn("loop", |mut shutdown| async move {
        shutdown.recv().await;
        Ok(())
    });

    let mut doomed = ServiceCore::new("doomed");
    doomed.start().unwrap();
    doomed.spawn("crash", |_shutdown| async move { panic!("boom") });

    let doomed_outcomes = doomed.wait().await;
    assert!(doomed_outcomes[0].is_failure());
    assert_eq!(doomed.state(), ServiceState::Crashed);

    // The sibling is untouched by the crash.
    assert_eq!(healthy.state(), ServiceState::Running);
    healthy.stop().unwrap();
    let outcomes = healthy.wait().await;
    assert!(matches!(outcomes[0], TaskOutcome::Completed { .. }));
}

#[tokio::test]
async fn double_start_is_rejected_until_stopped() {
    let mut core = ServiceCore::new("strict");
    core.start().unwrap();
    assert!(matches!(
        core.start(),
        Err(LifecycleError::AlreadyRunning(_))
    ));

    core.stop().unwrap();
    core.wait().await;
    core.start().unwrap();
    assert_eq!(core.state(), ServiceState::Running);
}

#[tokio::test]
async fn service_set_reports_per_service_outcomes() {
    let mut healthy = ServiceCore::new("alpha");
    healthy.spawn("idle", |mut shutdown| async move {
        shutdown.recv().await;
        Ok(())
    });
    let mut doomed = ServiceCore::new("beta");
    doomed.spawn("crash", |_shutdown| async move { panic!("beta down") });

    let mut set = ServiceSet::new();
    set.push(Box::new(healthy));
    set.push(Box::new(doomed));
    set.start_all().unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    set.stop_all();
    let reports = set.join_all().await;

    assert_eq!(reports.len(), 2);
    let alpha = reports.iter().find(|r| r.service == "alpha").unwrap();
    let beta = reports.iter().find(|r| r.service == "beta").unwrap();
    assert!(!alpha.crashed());
    assert!(beta.crashed());
}
