//! Startup: pre-flight, spawn and readiness.

use std::time::Duration;

use engine_supervisor::{
    LifecycleError, OutputTarget, ReadinessPoller, StartOutcome, SupervisorOptions,
    SupervisorState,
};

use crate::fixture::{body, options, refused, supervisor, Engine};

#[tokio::test(start_paused = true)]
async fn test_start_reaches_ready() {
    let engine = Engine::new();
    let mut supervisor = supervisor(options(), &engine);

    let outcome = supervisor.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::Ready { attempts: 1 });
    assert_eq!(supervisor.state(), SupervisorState::Ready);
    assert!(supervisor.is_running());
    assert_eq!(engine.spawns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_launch_spec_passed_to_launcher() {
    let engine = Engine::new();
    let options = SupervisorOptions {
        extra_arguments: vec!["-v".into(), "Eval.JitPGO=0".into()],
        output_dir: Some("/tmp/perf-run".into()),
        ..options()
    };
    let mut supervisor = supervisor(options, &engine);

    supervisor.start().await.unwrap();

    let spec = engine.with(|s| s.spawns[0].clone());
    assert_eq!(spec.program, std::path::PathBuf::from("/opt/hhvm/bin/hhvm"));
    assert_eq!(&spec.args[..2], &["-m", "server"]);
    assert_eq!(&spec.args[spec.args.len() - 2..], &["-v", "Eval.JitPGO=0"]);
    assert_eq!(
        spec.output,
        OutputTarget::File("/tmp/perf-run/hhvm.out".into())
    );

    let process = supervisor.process().expect("process retained");
    assert_eq!(process.args(), spec.args.as_slice());
    assert_eq!(process.output(), &spec.output);
    assert_eq!(process.pid(), Some(4242));
}

#[tokio::test(start_paused = true)]
async fn test_ready_at_third_attempt_stops_polling() {
    let engine = Engine::new();
    engine.script_health(vec![
        refused(),
        body("failure"),
        body(r#"{"readinessCounter": 42}"#),
        body(r#"{"readinessCounter": 43}"#),
    ]);
    let poller = ReadinessPoller::new("/check-health")
        .with_attempts(10, Duration::from_secs(1))
        .with_readiness_field("readinessCounter");
    let mut supervisor = supervisor(options(), &engine).with_poller(poller);

    let outcome = supervisor.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::Ready { attempts: 3 });
    assert_eq!(engine.requests_to("/check-health"), 3);
    assert_eq!(supervisor.state(), SupervisorState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_tears_down_engine() {
    let engine = Engine::new();
    engine.script_health(vec![refused()]);
    let mut supervisor = supervisor(options(), &engine);

    let outcome = supervisor.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::ReadinessTimeout { attempts: 10 });
    assert!(!outcome.is_ready());
    assert_eq!(supervisor.state(), SupervisorState::Failed);
    assert!(!supervisor.is_running());
    assert!(!engine.running());
    // Ten polls, plus the health check made by the stop path.
    assert_eq!(engine.requests_to("/check-health"), 11);
    assert_eq!(engine.requests_to("/stop"), 0);
    assert_eq!(engine.terminations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_warming_engine_is_retried_until_timeout() {
    let engine = Engine::new();
    engine.script_health(vec![body(r#"{"tc-size": 0}"#)]);
    let options = SupervisorOptions {
        health_check_attempts: 4,
        ..options()
    };
    let mut supervisor = supervisor(options, &engine);

    let outcome = supervisor.start().await.unwrap();

    assert_eq!(outcome, StartOutcome::ReadinessTimeout { attempts: 4 });
    assert!(!engine.running());
}

#[tokio::test(start_paused = true)]
async fn test_engine_dead_after_spawn() {
    let engine = Engine::new();
    engine.with(|s| s.survives_spawn = false);
    let mut supervisor = supervisor(options(), &engine);

    let result = supervisor.start().await;

    assert!(matches!(result, Err(LifecycleError::SpawnFailed(_))));
    assert_eq!(supervisor.state(), SupervisorState::Failed);
    assert_eq!(engine.requests_to("/check-health"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_rejected() {
    let engine = Engine::new();
    let mut supervisor = supervisor(options(), &engine);
    supervisor.start().await.unwrap();

    let result = supervisor.start().await;

    assert!(matches!(result, Err(LifecycleError::AlreadyStarted)));
    assert_eq!(engine.spawns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let engine = Engine::new();
    let mut supervisor = supervisor(options(), &engine);

    supervisor.start().await.unwrap();
    supervisor.stop().await.unwrap();
    let outcome = supervisor.start().await.unwrap();

    assert!(outcome.is_ready());
    assert_eq!(engine.spawns(), 2);
}

#[cfg(unix)]
mod preflight {
    use super::*;
    use crate::fixture::fake_check_binary;

    fn benchmarking(binary: std::path::PathBuf) -> SupervisorOptions {
        SupervisorOptions {
            binary,
            not_benchmarking: false,
            ..options()
        }
    }

    #[tokio::test]
    async fn test_failed_checks_abort_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_check_binary(
            dir.path(),
            r#"{"A":{"Value":1,"Required Value":2,"OK":false},"B":{"Value":0,"Required Value":1,"OK":false}}"#,
        );
        let engine = Engine::new();
        let mut supervisor = supervisor(benchmarking(binary), &engine);

        let result = supervisor.start().await;

        match result {
            Err(LifecycleError::PreflightFailed {
                failures,
                diagnostics,
            }) => {
                assert_eq!(failures, 2);
                assert_eq!(
                    diagnostics,
                    vec!["A: 1 vs required 2", "B: 0 vs required 1"]
                );
            }
            other => panic!("expected pre-flight failure, got {:?}", other),
        }
        assert_eq!(engine.spawns(), 0);
        assert_eq!(supervisor.state(), SupervisorState::Failed);
    }

    #[tokio::test]
    async fn test_malformed_report_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_check_binary(dir.path(), "Fatal error: unable to open script");
        let engine = Engine::new();
        let mut supervisor = supervisor(benchmarking(binary), &engine);

        let result = supervisor.start().await;

        assert!(matches!(result, Err(LifecycleError::Preflight(_))));
        assert_eq!(engine.spawns(), 0);
    }

    #[tokio::test]
    async fn test_passing_checks_with_old_version_start_engine() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_check_binary(
            dir.path(),
            r#"{"HHVM_VERSION":"3.3.0","A":{"Value":1,"Required Value":1,"OK":true}}"#,
        );
        let engine = Engine::new();
        let mut supervisor = supervisor(benchmarking(binary), &engine);

        let outcome = supervisor.start().await.unwrap();

        assert!(outcome.is_ready());
        assert_eq!(engine.spawns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_skips_validation() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_check_binary(
            dir.path(),
            r#"{"A":{"Value":1,"Required Value":2,"OK":false}}"#,
        );
        let engine = Engine::new();
        let options = SupervisorOptions {
            not_benchmarking: true,
            ..benchmarking(binary)
        };
        let mut supervisor = supervisor(options, &engine);

        let outcome = supervisor.start().await.unwrap();

        assert!(outcome.is_ready());
    }
}
