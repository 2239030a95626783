//! End-to-end expansion and execution against the demo deploy workspace.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use stagehand_core::{Implementation, Implementations, Repository, RepositoryError};
use stagehand_sequence::{Command, SequenceError, TaskSequences};

fn demo(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../demos/deploy")
        .join(file)
}

fn implementations(log: Arc<Mutex<Vec<String>>>) -> Implementations {
    Implementations::new()
        .with(Implementation::new("stagehand.builtin.Echo").fallback(move |call| {
            let line = format!("{} {}", call.task, call.object.ref_string());
            log.lock().map_err(|e| e.to_string())?.push(line);
            Ok(json!({"task": call.task, "obj": call.object.ref_string()}))
        }))
        .with(Implementation::new("stagehand.builtin.Noop").fallback(|_| Ok(Value::Null)))
}

fn repository(log: Arc<Mutex<Vec<String>>>) -> Repository {
    let mut repo = Repository::new(implementations(log));
    repo.load_packages_file(&demo("packages.yaml")).unwrap();
    repo.load_objects_file(&demo("objects.yaml")).unwrap();
    repo
}

fn query() -> Value {
    json!({"app": {"tags": ["a", "b", "c"]}, "reg": {"labels": ["abc"]}})
}

fn expected_commands() -> Vec<String> {
    let regions = ["abc1", "abc2", "abc3"];
    let apps = ["a", "b", "c"];
    let pairs: Vec<String> = regions
        .iter()
        .flat_map(|r| apps.iter().map(move |a| format!("{r}_{a}")))
        .collect();
    let mut out: Vec<String> = regions
        .iter()
        .map(|r| format!("deploy.Region.login {r}"))
        .collect();
    for task in [
        "file.Directory.rmtree",
        "file.Directory.copytree",
        "file.File.render_template",
        "deploy.RegionApp.push_app",
    ] {
        out.extend(pairs.iter().map(|p| format!("{task} {p}")));
    }
    out
}

// ---------------------------------------------------------------------------
// 1. Expansion
// ---------------------------------------------------------------------------

#[test]
fn deploy_app_expands_to_39_ordered_commands() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let commands = seqs.resolve(&repo, &query(), "deploy_app").unwrap();
    assert_eq!(commands.len(), 39);
    assert_eq!(commands, expected_commands());
}

#[test]
fn context_rows_are_region_major() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let rows = seqs.resolve_context(&repo, &query(), "deploy_app").unwrap();
    assert_eq!(rows.len(), 9);
    assert_eq!(rows[0].to_refs(), json!({"reg": "deploy.Region/abc1", "app": "deploy.App/a"}));
    assert_eq!(rows[1].to_refs(), json!({"reg": "deploy.Region/abc1", "app": "deploy.App/b"}));
    assert_eq!(rows[8].to_refs(), json!({"reg": "deploy.Region/abc3", "app": "deploy.App/c"}));
}

#[test]
fn unspecified_variables_select_everything() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let commands = seqs
        .resolve(&repo, &json!({"reg": {"tags": ["abc2"]}}), "clone_app")
        .unwrap();
    assert_eq!(
        commands,
        vec![
            "file.Directory.rmtree abc2_a",
            "file.Directory.rmtree abc2_b",
            "file.Directory.rmtree abc2_c",
            "file.Directory.copytree abc2_a",
            "file.Directory.copytree abc2_b",
            "file.Directory.copytree abc2_c",
        ]
    );
}

#[test]
fn templates_see_object_fields() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::from_value(&json!({
        "arguments": {"region": {"reg": "deploy.Region"}},
        "sequences": {
            "show": {"region": [
                {"cmd": "deploy.Region.login {{reg.tag}} '{url: \"{{reg.url}}\", ref: {{reg.ref}}, first: {{reg.labels | first}} }'"},
            ]},
        },
    }))
    .unwrap();
    let commands = seqs
        .resolve(&repo, &json!({"reg": {"tags": ["abc2"]}}), "show")
        .unwrap();
    let cmd = Command::parse(&commands[0]).unwrap();
    assert_eq!(cmd.tag, "abc2");
    assert_eq!(cmd.args["url"], json!("https://abc2.example.com"));
    assert_eq!(cmd.args["ref"], json!("deploy.Region/abc2"));
    assert_eq!(cmd.args["first"], json!("def"));
}

#[test]
fn query_errors_surface() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let err = seqs
        .resolve(&repo, &json!({"zone": {"all": true}}), "deploy_app")
        .unwrap_err();
    assert!(matches!(err, SequenceError::UnknownVariable { .. }), "got: {err}");
    let err = seqs
        .resolve(&repo, &json!({"reg": {"labels": ["abc", "abc"]}}), "deploy_app")
        .unwrap_err();
    assert!(
        matches!(err, SequenceError::Repository(RepositoryError::InvalidQuery(_))),
        "got: {err}"
    );
    let err = seqs.resolve(&repo, &query(), "nope").unwrap_err();
    assert!(matches!(err, SequenceError::UnknownSequence(_)));
}

#[test]
fn expanded_tags_parse_back_to_the_same_object() {
    let mut repo = repository(Arc::default());
    let err = repo
        .add(json!({"kind": "deploy.Region", "tag": "my region"}))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidObject(_)), "got: {err}");

    repo.add(json!({"kind": "deploy.Region", "tag": "eu-west.1_b", "url": "https://eu"}))
        .unwrap();
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let commands = seqs
        .resolve(&repo, &json!({"reg": {"tags": ["eu-west.1_b"]}}), "region_login")
        .unwrap();
    assert_eq!(commands, vec!["deploy.Region.login eu-west.1_b"]);
    let cmd = Command::parse(&commands[0]).unwrap();
    assert_eq!(cmd.tag, "eu-west.1_b");
    assert_eq!(cmd.invoke(&repo).unwrap().obj, "deploy.Region/eu-west.1_b");
}

// ---------------------------------------------------------------------------
// 2. Execution
// ---------------------------------------------------------------------------

#[test]
fn run_sequence_invokes_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let repo = repository(Arc::clone(&log));
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let outputs = seqs.run_sequence(&repo, &query(), "deploy_app").unwrap();
    assert_eq!(outputs.len(), 39);
    assert_eq!(outputs[0].task, "deploy.Region.login");
    assert_eq!(outputs[0].obj, "deploy.Region/abc1");
    assert_eq!(outputs[38].result, json!({"task": "push_app", "obj": "deploy.RegionApp/abc3_c"}));

    let log = log.lock().unwrap();
    assert_eq!(log[3], "rmtree file.Directory/abc1_a");
    assert_eq!(log.len(), 39);
}

#[test]
fn run_sequence_with_can_stop_early() {
    let repo = repository(Arc::default());
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let mut seen = 0;
    let summary = seqs
        .run_sequence_with(&repo, &query(), "deploy_app", |_| {
            seen += 1;
            if seen == 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(summary.total, 39);
    assert_eq!(summary.executed, 5);
    assert!(summary.stopped);
}

#[test]
fn failing_task_aborts_the_run() {
    let mut impls = implementations(Arc::default());
    impls.register(
        Implementation::new("stagehand.builtin.Echo")
            .task("login", |_| Ok(Value::Null))
            .task("rmtree", |call| {
                if call.object.tag() == "abc1_b" {
                    Err("disk full".into())
                } else {
                    Ok(Value::Null)
                }
            })
            .fallback(|_| Ok(Value::Null)),
    );
    let mut repo = Repository::new(impls);
    repo.load_packages_file(&demo("packages.yaml")).unwrap();
    repo.load_objects_file(&demo("objects.yaml")).unwrap();
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();

    let mut ran = Vec::new();
    let err = seqs
        .run_sequence_with(&repo, &query(), "deploy_app", |out| {
            ran.push(out.obj);
            ControlFlow::Continue(())
        })
        .unwrap_err();
    assert!(
        matches!(err, SequenceError::Repository(RepositoryError::TaskFailed { ref obj, .. }) if obj == "file.Directory/abc1_b"),
        "got: {err}"
    );
    assert_eq!(ran.len(), 4);
}

// ---------------------------------------------------------------------------
// 3. Structure
// ---------------------------------------------------------------------------

#[test]
fn tree_nests_sub_sequences() {
    let seqs = TaskSequences::load_file(&demo("tasks.yaml")).unwrap();
    let tree = seqs.tree("deploy_app").unwrap();
    assert_eq!(tree["arguments"], json!("application"));
    assert_eq!(tree["body"][0]["seq"]["name"], json!("region_login"));
    assert_eq!(
        tree["body"][0]["seq"]["body"][0],
        json!({"cmd": "deploy.Region.login {{reg.tag}}"})
    );
    assert_eq!(
        seqs.subsequences("deploy_app").unwrap(),
        vec!["region_login", "clone_app", "render_template", "push_app"]
    );
}
