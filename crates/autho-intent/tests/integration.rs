//! Integration tests for the autho-intent crate.
//!
//! These tests run workflows and natural-language commands against the real
//! filesystem and control adapters inside a temporary root directory.

use std::sync::Arc;

use autho_adapters::{ControlAdapter, FilesystemAdapter};
use autho_intent::{
    ErrorPolicy, IntentKind, IntentParser, NaturalLanguageInterface, RunStatus, StepStatus,
    Workflow, WorkflowExecutor,
};
use autho_kernel::CapabilityRegistry;
use serde_json::{Value, json};
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<CapabilityRegistry>) {
    let dir = tempfile::tempdir().unwrap();
    let registry = CapabilityRegistry::new();
    registry.register(Arc::new(FilesystemAdapter::new("filesystem", dir.path().to_path_buf())));
    registry.register(Arc::new(ControlAdapter::new("control")));
    (dir, Arc::new(registry))
}

// ═══════════════════════════════════════════════════════════════════════
//  Workflows
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn file_pipeline_chains_results_through_the_context() {
    let (dir, registry) = setup();
    let executor = WorkflowExecutor::new(registry);

    let mut wf = Workflow::new("report")
        .with_context("owner", "ops")
        .write_file("write", "in/report.txt", "owner={{owner}}")
        .read_file("read", "in/report.txt")
        .save_as("report")
        .copy_file("backup", "in/report.txt", "backup/report.txt")
        .list_files("listing", "backup", "*.txt")
        .log("announce", "copied {{listing}}")
        .when("len(listing) == 1")
        .delete_file("cleanup", "in/report.txt")
        .after("backup");

    let report = executor.run(&mut wf);

    assert_eq!(report.status, RunStatus::Completed, "{report:#?}");
    assert_eq!(report.results["report"], json!("owner=ops"));
    assert_eq!(report.results["listing"], json!(["backup/report.txt"]));
    assert_eq!(
        report.step("announce").unwrap().result.as_deref(),
        Some(r#"copied ["backup/report.txt"]"#)
    );
    assert!(dir.path().join("backup/report.txt").exists());
    assert!(!dir.path().join("in/report.txt").exists());
}

#[test]
fn path_escape_fails_the_step() {
    let (_dir, registry) = setup();
    let executor = WorkflowExecutor::new(registry);

    let mut wf = Workflow::new("escape")
        .read_file("steal", "../../etc/passwd")
        .log("after", "unreachable");
    let report = executor.run(&mut wf);

    assert_eq!(report.failed_step.as_deref(), Some("steal"));
    assert!(report.steps[0].error.as_deref().unwrap().contains("outside the root directory"));
    assert_eq!(report.steps.len(), 1);
}

#[test]
fn missing_file_can_be_skipped() {
    let (_dir, registry) = setup();
    let executor = WorkflowExecutor::new(registry);

    let mut wf = Workflow::new("optional")
        .read_file("maybe", "absent.txt")
        .on_error(ErrorPolicy::Skip)
        .log("fallback", "no file")
        .when("not defined(maybe)");
    let report = executor.run(&mut wf);

    assert!(report.is_success());
    assert_eq!(report.steps[0].status, StepStatus::Skipped);
    assert!(report.steps[0].error.is_some());
    assert_eq!(report.steps[1].status, StepStatus::Completed);
}

#[test]
fn saved_workflow_file_runs_after_reload() {
    let (dir, registry) = setup();
    let executor = WorkflowExecutor::new(registry);

    Workflow::new("greet")
        .with_description("write and read a greeting")
        .write_file("write", "hello.txt", "hi {{name}}")
        .read_file("read", "hello.txt")
        .save_to_file(dir.path().join("greet.json"))
        .unwrap();

    let mut wf = Workflow::load_from_file(dir.path().join("greet.json")).unwrap();
    let report = executor.run_with_context(&mut wf, [("name".to_string(), json!("Ada"))]);

    assert!(report.is_success());
    assert_eq!(report.results["read"], json!("hi Ada"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Natural-language interface
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn conversation_over_the_filesystem() {
    let (dir, registry) = setup();
    let mut nli = NaturalLanguageInterface::new(IntentParser::new(), registry);

    let wrote = nli.process("write 'hello there' to greeting.txt");
    assert!(wrote.success, "{wrote:?}");
    assert_eq!(wrote.intent, IntentKind::WriteFile);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("greeting.txt")).unwrap(),
        "hello there"
    );

    let read = nli.process("read file greeting.txt");
    assert_eq!(read.result, Some(Value::String("hello there".into())));

    let copied = nli.process("copy greeting.txt to backup/greeting.txt");
    assert!(copied.success, "{copied:?}");

    let listed = nli.process("list files in backup");
    assert_eq!(listed.result, Some(json!(["backup/greeting.txt"])));

    let missing = nli.process("read file nope.txt");
    assert!(!missing.success);
    assert!(missing.error.is_some());

    assert_eq!(nli.history().len(), 5);
}

#[test]
fn run_workflow_command_executes_a_fresh_copy() {
    let (dir, registry) = setup();
    let mut nli = NaturalLanguageInterface::new(IntentParser::new(), registry);
    nli.register_workflow(Workflow::new("stamp").write_file("write", "stamp.txt", "done"));

    for _ in 0..2 {
        let out = nli.process("run workflow stamp");
        assert!(out.success, "{out:?}");
        assert_eq!(out.result.unwrap()["status"], "completed");
    }
    assert_eq!(std::fs::read_to_string(dir.path().join("stamp.txt")).unwrap(), "done");
}
