//! Batch runs over the demo deploy workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use stagehand_batch::{
    run, BatchError, BatchJob, CancellationToken, WorkerStatus, Workspace, WorkspaceFactory,
};
use stagehand_core::{Implementation, Implementations, Repository, TaskCall, TaskFailure, TaskFn};
use stagehand_sequence::{SequenceError, TaskSequences};
use tempfile::TempDir;

fn demo(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../demos/deploy")
        .join(file)
}

fn handler<F>(f: F) -> TaskFn
where
    F: Fn(TaskCall<'_>) -> Result<Value, TaskFailure> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn factory(echo: TaskFn) -> WorkspaceFactory {
    Arc::new(move || -> Result<Workspace, BatchError> {
        let implementations = Implementations::new()
            .with(Implementation::new("stagehand.builtin.Echo").fallback({
                let echo = Arc::clone(&echo);
                move |call| echo(call)
            }))
            .with(Implementation::new("stagehand.builtin.Noop").fallback(|_| Ok(Value::Null)));
        let mut repository = Repository::new(implementations);
        repository.load_packages_file(&demo("packages.yaml"))?;
        repository.load_objects_file(&demo("objects.yaml"))?;
        let sequences = TaskSequences::load_file(&demo("tasks.yaml"))?;
        Ok(Workspace {
            repository,
            sequences,
        })
    })
}

fn echo() -> TaskFn {
    handler(|call| Ok(json!({"task": call.task, "obj": call.object.ref_string()})))
}

fn job(dir: &TempDir, sequences: &[&str]) -> BatchJob {
    BatchJob::new(
        dir.path(),
        sequences.iter().map(|s| s.to_string()).collect(),
        json!({"app": {"tags": ["a", "b", "c"]}, "reg": {"labels": ["abc"]}}),
    )
    .with_name("job1")
    .with_poll_interval(Duration::from_millis(20))
}

fn log_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn each_sequence_logs_its_outputs() {
    let dir = TempDir::new().unwrap();
    let report = run(
        job(&dir, &["region_login", "clone_app"]),
        factory(echo()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.job_dir, dir.path().join("job1"));
    let names: Vec<_> = report.workers.iter().map(|w| w.sequence.as_str()).collect();
    assert_eq!(names, ["region_login", "clone_app"]);
    assert_eq!(report.workers[0].status, WorkerStatus::Succeeded { executed: 3 });
    assert_eq!(report.workers[1].status, WorkerStatus::Succeeded { executed: 18 });

    let lines = log_lines(&dir.path().join("job1/region_login.txt"));
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["task"], "deploy.Region.login");
    assert_eq!(lines[2]["obj"], "deploy.Region/abc3");
    assert!(lines[0]["duration"].is_f64());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_sequence_fans_out_over_nested_sequences() {
    let dir = TempDir::new().unwrap();
    let report = run(job(&dir, &["deploy_app"]), factory(echo()), CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<_> = report.workers.iter().map(|w| w.sequence.as_str()).collect();
    assert_eq!(names, ["region_login", "clone_app", "render_template", "push_app"]);
    let executed: usize = report.workers.iter().map(|w| w.status.executed()).sum();
    assert_eq!(executed, 39);
    assert!(dir.path().join("job1/push_app.txt").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_are_reported_per_worker() {
    let dir = TempDir::new().unwrap();
    let failing = handler(|call| {
        if call.task == "rmtree" && call.object.tag() == "abc1_b" {
            Err("disk full".into())
        } else {
            Ok(Value::Null)
        }
    });
    let report = run(
        job(&dir, &["region_login", "clone_app"]),
        factory(failing),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.exit_code(), 1);
    assert!(report.workers[0].status.is_success());
    match &report.workers[1].status {
        WorkerStatus::Failed { executed, error } => {
            assert_eq!(*executed, 1);
            assert!(error.contains("disk full"), "got: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    let lines = log_lines(&report.workers[1].log_file);
    assert_eq!(lines.len(), 2);
    assert!(lines[1]["error"].as_str().unwrap().contains("abc1_b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_batch_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = run(job(&dir, &["deploy_app"]), factory(echo()), cancel)
        .await
        .unwrap();
    assert_eq!(report.workers.len(), 4);
    assert!(report
        .workers
        .iter()
        .all(|w| w.status == WorkerStatus::Cancelled { executed: 0 }));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_before_the_next_command() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let cancelling = {
        let cancel = cancel.clone();
        let calls = Arc::clone(&calls);
        handler(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                cancel.cancel();
            }
            Ok(Value::Null)
        })
    };
    let report = run(job(&dir, &["region_login"]), factory(cancelling), cancel)
        .await
        .unwrap();
    assert_eq!(report.workers[0].status, WorkerStatus::Cancelled { executed: 2 });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(log_lines(&report.workers[0].log_file).len(), 2);
}

#[tokio::test]
async fn unknown_sequences_fail_before_any_worker_starts() {
    let dir = TempDir::new().unwrap();
    let err = run(
        job(&dir, &["region_login", "nope"]),
        factory(echo()),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, BatchError::Sequence(SequenceError::UnknownSequence(ref n)) if n == "nope"),
        "got: {err}"
    );
    assert!(!dir.path().join("job1").exists());

    let err = run(job(&dir, &[]), factory(echo()), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::NoSequences));
}
