#[path = "../common/mod.rs"]
mod common;

use common::{arg_after, engine_with, write_volume, FakeEngine, RIGID_PARAMETERS};
use regstrategy::core::error::{EXIT_CODE_CONTEXT_KEY, STDERR_CONTEXT_KEY};
use regstrategy::core::strategy::{
    CancelToken, ChannelReporter, StatusEvent, StrategyEdge, StrategyNode, TracingReporter,
    Transformation,
};
use regstrategy::core::types::{ErrorCategory, NodeState};
use std::fs;
use tempfile::TempDir;

struct Scenario {
    dir: TempDir,
    edge: StrategyEdge,
}

/// hi-3 registered onto hi-5 with the parameters from Sample.txt.
fn scenario() -> Scenario {
    let dir = TempDir::new().unwrap();
    let moving = dir.path().join("data").join("hi-3.mhd");
    let fixed = dir.path().join("data").join("hi-5.mhd");
    write_volume(&moving);
    write_volume(&fixed);
    let parameters = dir.path().join("Sample.txt");
    fs::write(&parameters, RIGID_PARAMETERS).unwrap();

    let parent = StrategyNode::new()
        .with_dataset(&moving)
        .with_fixed_data(&fixed);
    let child = StrategyNode::new().with_output_folder(dir.path().join("out"));
    let transformation = Transformation::from_file(&parameters).unwrap();

    Scenario {
        edge: StrategyEdge::connecting(parent, child, transformation),
        dir,
    }
}

#[tokio::test]
async fn test_execute_materializes_child() {
    let Scenario { dir, mut edge } = scenario();
    let runner = FakeEngine::new();
    let engine = engine_with(runner.clone());

    let dataset = edge
        .execute(&engine, &TracingReporter, &CancelToken::never())
        .await
        .unwrap();

    let out = dir.path().join("out");
    assert_eq!(dataset, out.join("result.0.mhd"));
    let child = edge.child_node.as_ref().unwrap();
    assert_eq!(child.dataset.as_deref(), Some(dataset.as_path()));
    assert!(!child.dirty);
    assert_eq!(child.state(), NodeState::Materialized);

    let calls = runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(arg_after(&calls[0], "-m"), dir.path().join("data").join("hi-3.mhd"));
    assert_eq!(arg_after(&calls[0], "-f"), dir.path().join("data").join("hi-5.mhd"));
    assert_eq!(arg_after(&calls[0], "-p"), out.join("parameters.txt"));
    assert_eq!(
        fs::read_to_string(out.join("parameters.txt")).unwrap(),
        RIGID_PARAMETERS
    );
}

#[tokio::test]
async fn test_missing_parent_dataset_leaves_child_unchanged() {
    let Scenario { mut edge, .. } = scenario();
    edge.parent_node.as_mut().unwrap().dataset = None;
    let before = edge.child_node.clone();
    let runner = FakeEngine::new();

    let err = edge
        .execute(&engine_with(runner.clone()), &TracingReporter, &CancelToken::never())
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::InvalidEdgeState);
    assert_eq!(edge.child_node, before);
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_child_without_output_folder_is_invalid() {
    let Scenario { mut edge, .. } = scenario();
    edge.child_node = Some(StrategyNode::new());

    let err = edge
        .execute(&engine_with(FakeEngine::new()), &TracingReporter, &CancelToken::never())
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::InvalidEdgeState);
}

#[tokio::test]
async fn test_engine_failure_carries_stderr() {
    let Scenario { dir, mut edge } = scenario();
    let runner = FakeEngine::failing_for(&[dir.path().join("out")]);
    let before = edge.child_node.clone();
    let (reporter, mut events) = ChannelReporter::new();

    let err = edge
        .execute(&engine_with(runner), &reporter, &CancelToken::never())
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::RegistrationEngineError);
    assert_eq!(err.context.get(EXIT_CODE_CONTEXT_KEY).map(String::as_str), Some("1"));
    assert!(err.context[STDERR_CONTEXT_KEY].contains("itk::ExceptionObject"));
    assert_eq!(edge.child_node, before);

    assert!(matches!(events.recv().await, Some(StatusEvent::EdgeStarted { .. })));
    match events.recv().await {
        Some(StatusEvent::EdgeFailed { code, .. }) => assert_eq!(code, "RS-ENGINE-001"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_fixed_data_defaults_to_parent_dataset() {
    let Scenario { dir, mut edge } = scenario();
    edge.parent_node.as_mut().unwrap().fixed_data = None;
    let runner = FakeEngine::new();

    edge.execute(&engine_with(runner.clone()), &TracingReporter, &CancelToken::never())
        .await
        .unwrap();

    let calls = runner.calls.lock().unwrap();
    let moving = dir.path().join("data").join("hi-3.mhd");
    assert_eq!(arg_after(&calls[0], "-f"), moving);
}

#[tokio::test]
async fn test_pre_cancelled_token_skips_engine() {
    let Scenario { mut edge, .. } = scenario();
    let (source, token) = regstrategy::core::strategy::CancelSource::new();
    source.cancel();
    let runner = FakeEngine::new();

    let err = edge
        .execute(&engine_with(runner.clone()), &TracingReporter, &token)
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::Cancelled);
    assert_eq!(runner.call_count(), 0);
}

#[cfg(unix)]
mod real_process {
    use super::*;
    use regstrategy::core::config::EngineConfig;
    use regstrategy::core::strategy::{CancelSource, RegistrationEngine};
    use std::path::Path;
    use std::time::{Duration, Instant};

    /// Shell script speaking the engine's command line, run through `sh`.
    fn write_script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-elastix.sh");
        fs::write(&path, format!("{}\n", body)).unwrap();
        path.display().to_string()
    }

    fn engine(script: String, timeout_seconds: u64) -> RegistrationEngine {
        RegistrationEngine::new(EngineConfig {
            binary: "sh".to_string(),
            extra_args: vec![script],
            timeout_seconds,
            ..EngineConfig::default()
        })
    }

    #[tokio::test]
    async fn test_script_engine_produces_result() {
        let Scenario { dir, mut edge } = scenario();
        let script = write_script(
            dir.path(),
            r#"while [ $# -gt 0 ]; do
  case "$1" in
    -out) out="$2"; shift ;;
  esac
  shift
done
echo registered > "$out/result.0.mhd""#,
        );

        let dataset = edge
            .execute(&engine(script, 0), &TracingReporter, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(dataset).unwrap().trim(), "registered");
    }

    #[tokio::test]
    async fn test_script_engine_failure_reports_stderr() {
        let Scenario { dir, mut edge } = scenario();
        let script = write_script(dir.path(), "echo 'metric diverged' >&2\nexit 3");

        let err = edge
            .execute(&engine(script, 0), &TracingReporter, &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err.context[EXIT_CODE_CONTEXT_KEY], "3");
        assert_eq!(err.stderr().map(str::trim), Some("metric diverged"));
        assert!(edge.child_node.as_ref().unwrap().dirty);
    }

    /// Writes a partial result, then blocks long enough to be interrupted.
    const SLOW_ENGINE: &str = r#"while [ $# -gt 0 ]; do
  case "$1" in
    -out) out="$2"; shift ;;
  esac
  shift
done
echo partial > "$out/result.0.mhd"
exec sleep 30"#;

    #[tokio::test]
    async fn test_script_engine_timeout() {
        let Scenario { dir, mut edge } = scenario();
        let script = write_script(dir.path(), SLOW_ENGINE);

        let err = edge
            .execute(&engine(script, 1), &TracingReporter, &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::TimeoutError);
        assert!(!dir.path().join("out").join("result.0.mhd").exists());
        assert!(edge.child_node.as_ref().unwrap().dirty);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_engine() {
        let Scenario { dir, mut edge } = scenario();
        let script = write_script(dir.path(), SLOW_ENGINE);
        let partial = dir.path().join("out").join("result.0.mhd");

        let (source, cancel) = CancelSource::new();
        let watched = partial.clone();
        let canceller = tokio::spawn(async move {
            for _ in 0..500 {
                if watched.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
            source.cancel();
        });

        let start = Instant::now();
        let err = edge
            .execute(&engine(script, 0), &TracingReporter, &cancel)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert_eq!(err.category, ErrorCategory::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(20));
        assert!(!partial.exists());
        let child = edge.child_node.as_ref().unwrap();
        assert!(child.dirty);
        assert_eq!(child.state(), NodeState::Pending);
        assert!(child.dataset.is_none());
    }

    #[tokio::test]
    async fn test_missing_engine_binary() {
        let Scenario { dir, mut edge } = scenario();
        let missing = RegistrationEngine::new(EngineConfig {
            binary: dir.path().join("no-such-engine").display().to_string(),
            ..EngineConfig::default()
        });

        let err = edge
            .execute(&missing, &TracingReporter, &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::RegistrationEngineError);
        assert_eq!(err.code, "RS-ENGINE-002");
    }
}
