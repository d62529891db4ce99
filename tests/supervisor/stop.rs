//! Shutdown: graceful admin stop, forceful fallback and idempotence.

use engine_supervisor::endpoints::FAILURE_SENTINEL;
use engine_supervisor::{AdminFailure, AdminResponse, LifecycleError, SupervisorState};

use crate::fixture::{body, options, refused, supervisor, Engine};

async fn started(engine: &Engine) -> engine_supervisor::EngineSupervisor {
    let mut supervisor = supervisor(options(), engine);
    assert!(supervisor.start().await.unwrap().is_ready());
    supervisor
}

#[tokio::test(start_paused = true)]
async fn test_graceful_stop() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;

    supervisor.stop().await.unwrap();

    assert_eq!(engine.requests_to("/stop"), 1);
    assert_eq!(engine.terminations(), 0);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(!supervisor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_is_idempotent() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;

    supervisor.stop().await.unwrap();
    let requests = engine.with(|s| s.requests.len());
    let terminations = engine.terminations();

    supervisor.stop().await.unwrap();

    assert_eq!(engine.with(|s| s.requests.len()), requests);
    assert_eq!(engine.terminations(), terminations);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_admin_falls_back_to_terminate() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;
    engine.script_health(vec![refused()]);

    supervisor.stop().await.unwrap();

    assert_eq!(engine.requests_to("/stop"), 0);
    assert_eq!(engine.terminations(), 1);
    assert!(!engine.running());
}

#[tokio::test(start_paused = true)]
async fn test_falsy_health_falls_back_to_terminate() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;
    engine.script_health(vec![body(FAILURE_SENTINEL)]);

    supervisor.stop().await.unwrap();

    assert_eq!(engine.requests_to("/stop"), 0);
    assert_eq!(engine.terminations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_stop_request_falls_back_to_terminate() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;
    engine.with(|s| {
        s.exits_on_stop = false;
        s.stop_response = Some(AdminResponse::Failure(AdminFailure::Transport(
            "connection reset".into(),
        )));
    });

    supervisor.stop().await.unwrap();

    assert_eq!(engine.requests_to("/stop"), 1);
    assert_eq!(engine.terminations(), 1);
    assert!(!engine.running());
}

#[tokio::test(start_paused = true)]
async fn test_engine_ignoring_stop_is_contract_violation() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;
    engine.with(|s| s.exits_on_stop = false);

    let result = supervisor.stop().await;

    assert!(matches!(
        result,
        Err(LifecycleError::GracefulStopFailed { pid: Some(4242) })
    ));
    // Still torn down so nothing leaks.
    assert_eq!(engine.terminations(), 1);
    assert!(!engine.running());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_after_engine_exited_is_noop() {
    let engine = Engine::new();
    let mut supervisor = started(&engine).await;
    engine.with(|s| s.running = false);

    supervisor.stop().await.unwrap();

    assert_eq!(engine.requests_to("/stop"), 0);
    assert_eq!(engine.terminations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_drop_kills_running_engine() {
    let engine = Engine::new();
    let supervisor = started(&engine).await;

    drop(supervisor);

    assert_eq!(engine.kills(), 1);
    assert_eq!(engine.terminations(), 0);
    assert!(!engine.running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_forceful_stop_keeps_runtime_responsive() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::fixture::{stubborn_engine_binary, unreachable_supervisor};

    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new();
    let options = engine_supervisor::SupervisorOptions {
        binary: stubborn_engine_binary(dir.path()),
        delay_process_launch: Duration::from_millis(200),
        delay_check_health: Duration::from_millis(10),
        health_check_attempts: 1,
        terminate_grace: Duration::from_secs(1),
        ..options()
    };
    let mut supervisor = unreachable_supervisor(options, &engine);

    let ticks = Arc::new(AtomicU32::new(0));
    let ticker = tokio::spawn({
        let ticks = ticks.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    let started = tokio::time::Instant::now();
    let outcome = supervisor.start().await.unwrap();
    let elapsed = started.elapsed();
    ticker.abort();

    assert_eq!(
        outcome,
        engine_supervisor::StartOutcome::ReadinessTimeout { attempts: 1 }
    );
    assert!(elapsed >= Duration::from_secs(1));
    // The grace period alone spans about ten ticks.
    assert!(ticks.load(Ordering::SeqCst) >= 8);
    assert!(!supervisor.is_running());
    assert_eq!(supervisor.state(), SupervisorState::Failed);
}
