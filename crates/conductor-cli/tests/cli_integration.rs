//! Integration tests for the conductor-cli commands.
//!
//! These tests exercise the same code paths as the binary, using in-memory
//! SQLite databases and temporary workflow files for isolation.

use std::path::PathBuf;
use std::sync::Arc;

use conductor_cli::commands;
use conductor_core::models::{JobStatus, WorkflowShape};
use conductor_core::state::{AppState, AppStateInner};
use conductor_core::{Database, EngineConfig};

/// In-memory AppState with no API key configured.
fn test_state() -> AppState {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    let agents = commands::agent_service(&EngineConfig::default());
    Arc::new(AppStateInner::new(db, agents))
}

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

fn sequence_workflow(dir: &tempfile::TempDir) -> String {
    write(dir, "launch.xml", "<prompt><task>Start</task></prompt>");
    write(dir, "next.md", "Keep going");
    write(
        dir,
        "workflow.xml",
        r#"<workflow>
  <sequence model="claude-4-sonnet" repository="https://github.com/acme/app" timeout="5m">
    <prompt src="launch.xml"/>
    <prompt src="next.md"/>
  </sequence>
</workflow>"#,
    )
    .to_string_lossy()
    .to_string()
}

#[tokio::test]
async fn test_submit_creates_local_job_with_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);

    let job = commands::job::submit(&state, &file, None, None).await.unwrap();
    assert_eq!(job.status, JobStatus::Local);
    assert_eq!(job.workflow_shape, WorkflowShape::Sequence);
    assert_eq!(job.model, "claude-4-sonnet");
    assert_eq!(job.timeout_millis, Some(300_000));

    let prompts = state.prompt_store.find_by_job_id(&job.id).await.unwrap();
    let srcs: Vec<&str> = prompts.iter().map(|p| p.src.as_str()).collect();
    assert_eq!(srcs, vec!["launch.xml", "next.md"]);
}

#[tokio::test]
async fn test_submit_overrides_model_and_repository() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);

    let job = commands::job::submit(
        &state,
        &file,
        Some("gpt-5".to_string()),
        Some("https://github.com/acme/other".to_string()),
    )
    .await
    .unwrap();
    assert_eq!(job.model, "gpt-5");
    assert_eq!(job.repository, "https://github.com/acme/other");
}

#[tokio::test]
async fn test_submit_missing_file_fails() {
    let state = test_state();
    let err = commands::job::submit(&state, "/nonexistent/workflow.xml", None, None)
        .await
        .unwrap_err();
    assert!(err.contains("Failed to submit"));
    assert!(state.job_store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);
    commands::job::submit(&state, &file, None, None).await.unwrap();

    let local = commands::job::list(&state, Some("local")).await.unwrap();
    assert_eq!(local.len(), 1);

    let running = commands::job::list(&state, Some("RUNNING")).await.unwrap();
    assert!(running.is_empty());

    let err = commands::job::list(&state, Some("paused")).await.unwrap_err();
    assert!(err.contains("Unknown status"));
}

#[tokio::test]
async fn test_show_and_delete_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);
    let job = commands::job::submit(&state, &file, None, None).await.unwrap();

    commands::job::show(&state, &job.id).await.unwrap();
    commands::job::delete(&state, &job.id).await.unwrap();

    assert!(state.job_store.find_by_id(&job.id).await.unwrap().is_none());
    assert!(state.prompt_store.find_by_job_id(&job.id).await.unwrap().is_empty());
    assert!(commands::job::show(&state, &job.id).await.is_err());
}

#[tokio::test]
async fn test_delete_removes_children() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);
    let parent = commands::job::submit(&state, &file, None, None).await.unwrap();

    // A launched child: the remote delete fails without an API key but the
    // local rows still go.
    let child = parent
        .clone()
        .with_parent(parent.id.clone(), 0)
        .with_remote_agent_id("bc-child".to_string());
    let child = conductor_core::models::Job {
        id: "child-1".to_string(),
        ..child
    };
    state.job_store.save(&child).await.unwrap();

    commands::job::delete(&state, &parent.id).await.unwrap();
    assert!(state.job_store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conversation_requires_launched_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);
    let job = commands::job::submit(&state, &file, None, None).await.unwrap();

    let err = commands::job::conversation(&state, &job.id).await.unwrap_err();
    assert!(err.contains("not been launched"));
}

#[tokio::test]
async fn test_run_once_without_api_key_leaves_jobs_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state();
    let file = sequence_workflow(&dir);
    let job = commands::job::submit(&state, &file, None, None).await.unwrap();

    let err = commands::run::run(&state, &EngineConfig::default(), true)
        .await
        .unwrap_err();
    assert!(err.contains("No API key"));

    let after = state.job_store.get(&job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Local);
    assert!(after.remote_agent_id.is_none());
}

#[test]
fn test_blank_api_key_is_rejected() {
    let config = EngineConfig {
        api_key: "   ".to_string(),
        ..EngineConfig::default()
    };
    assert!(commands::run::require_api_key(&config).is_err());

    let config = EngineConfig {
        api_key: "key-123".to_string(),
        ..EngineConfig::default()
    };
    assert!(commands::run::require_api_key(&config).is_ok());
}

#[tokio::test]
async fn test_validate_reports_parallel_shape() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        &dir,
        "workflow.xml",
        r#"<workflow>
  <parallel>
    <prompt src="plan.xml" bindResultType="List_Integer"/>
    <sequence model="m1" repository="https://github.com/acme/a">
      <prompt src="work.xml" bindExp="get-current-value"/>
    </sequence>
    <sequence model="m2" repository="https://github.com/acme/b">
      <prompt src="work.xml" bindExp="get-current-value"/>
      <prompt src="review.md"/>
    </sequence>
  </parallel>
</workflow>"#,
    );

    let report = commands::workflow::validate(&file.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(report.shape, "PARALLEL");
    assert_eq!(report.branch_count, 2);
    assert_eq!(report.definition.model, "m1");
}

#[tokio::test]
async fn test_validate_rejects_broken_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(&dir, "workflow.xml", "<workflow><sequence></workflow>");
    assert!(commands::workflow::validate(&file.to_string_lossy())
        .await
        .is_err());
}
