use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn demo_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/deploy")
}

/// `stagehand -c demos/deploy/stagehand.yaml` with an isolated home.
fn stagehand(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("stagehand"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG")
        .arg("-c")
        .arg(demo_dir().join("stagehand.yaml"));
    cmd
}

fn stdout_json_lines(output: &std::process::Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect()
}

const QUERY: &str = "{app: {tags: [a, b, c]}, reg: {labels: [abc]}}";

#[test]
fn show_lists_kinds_and_sequences() {
    let home = TempDir::new().expect("home");
    stagehand(home.path())
        .arg("show")
        .assert()
        .success()
        .stdout(contains("deploy.RegionApp"))
        .stdout(contains("stagehand.builtin.Echo"))
        .stdout(contains("deploy_app"));
}

#[test]
fn query_prints_tags_per_kind() {
    let home = TempDir::new().expect("home");
    let output = stagehand(home.path())
        .args(["-f", "json", "query", "{deploy.Region: {labels: [def]}, deploy.App: {tags: c}}"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(
        value,
        serde_json::json!({"deploy.Region": ["abc2"], "deploy.App": ["c"]})
    );
}

#[test]
fn run_inspect_lists_commands_in_order() {
    let home = TempDir::new().expect("home");
    let output = stagehand(home.path())
        .args(["-f", "json", "run", QUERY, "deploy_app", "--inspect"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let commands: Vec<String> = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(commands.len(), 39);
    assert_eq!(commands[0], "deploy.Region.login abc1");
    assert_eq!(commands[3], "file.Directory.rmtree abc1_a");
    assert_eq!(commands[38], "deploy.RegionApp.push_app abc3_c");
}

#[test]
fn run_streams_task_outputs() {
    let home = TempDir::new().expect("home");
    let output = stagehand(home.path())
        .args(["-f", "json", "run", QUERY, "region_login"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let lines = stdout_json_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["task"], "deploy.Region.login");
    assert_eq!(lines[1]["obj"], "deploy.Region/abc2");
    assert_eq!(lines[1]["result"]["task"], "login");

    stagehand(home.path())
        .args(["run", QUERY, "region_login"])
        .assert()
        .success()
        .stdout(contains("---\n"))
        .stdout(contains("obj: deploy.Region/abc3"));
}

#[test]
fn context_prints_one_row_per_pair() {
    let home = TempDir::new().expect("home");
    let query_file = home.path().join("query.yaml");
    fs::write(&query_file, "reg:\n  tags: [abc1]\n").expect("write query");
    let output = stagehand(home.path())
        .args(["-f", "json", "context"])
        .arg(&query_file)
        .arg("clone_app")
        .output()
        .expect("run");
    assert!(output.status.success());
    let rows = stdout_json_lines(&output);
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[2],
        serde_json::json!({"reg": "deploy.Region/abc1", "app": "deploy.App/c"})
    );
}

#[test]
fn dump_emits_loadable_documents() {
    let home = TempDir::new().expect("home");
    stagehand(home.path())
        .args(["dump", "--packages"])
        .assert()
        .success()
        .stdout(contains("package: deploy"))
        .stdout(contains("package: file"));

    let output = stagehand(home.path())
        .args(["-f", "json", "dump"])
        .output()
        .expect("run");
    let objects = stdout_json_lines(&output);
    assert_eq!(objects.len(), 33);
    assert!(objects
        .iter()
        .any(|o| o["kind"] == "deploy.Region" && o["tag"] == "abc1" && o["labels"][0] == "abc"));
}

#[test]
fn batch_writes_a_log_per_sequence() {
    let home = TempDir::new().expect("home");
    stagehand(home.path())
        .args(["batch", QUERY, "deploy_app", "--name", "job1"])
        .assert()
        .success()
        .stdout(contains("succeeded"));

    let job = home.path().join(".stagehand/batch/job1");
    for sequence in ["region_login", "clone_app", "render_template", "push_app"] {
        assert!(job.join(format!("{sequence}.txt")).is_file(), "{sequence}");
    }
    let clone_log = fs::read_to_string(job.join("clone_app.txt")).expect("log");
    assert_eq!(clone_log.lines().count(), 18);
}

#[test]
fn batch_exits_non_zero_when_a_worker_fails() {
    let home = TempDir::new().expect("home");
    let logs = home.path().join("logs");
    stagehand(home.path())
        .args(["batch", "{zone: {all: true}}", "region_login", "clone_app", "--name", "job2", "--log-dir"])
        .arg(&logs)
        .assert()
        .failure()
        .stdout(contains("failed"));

    let log = fs::read_to_string(logs.join("job2/region_login.txt")).expect("log");
    let line: Value = serde_json::from_str(log.trim()).expect("error line");
    assert!(line["error"].as_str().expect("error").contains("zone"));
}

#[test]
fn missing_documents_are_reported() {
    let home = TempDir::new().expect("home");
    Command::new(assert_cmd::cargo::cargo_bin!("stagehand"))
        .current_dir(home.path())
        .env("HOME", home.path())
        .arg("-p")
        .arg(demo_dir().join("packages.yaml"))
        .arg("-o")
        .arg(demo_dir().join("objects.yaml"))
        .args(["context", "{}", "deploy_app"])
        .assert()
        .failure()
        .stderr(contains("-t/--tasks"));
}

#[test]
fn unknown_sequence_fails_with_its_name() {
    let home = TempDir::new().expect("home");
    stagehand(home.path())
        .args(["run", QUERY, "nope"])
        .assert()
        .failure()
        .stderr(contains("nope"));
}
