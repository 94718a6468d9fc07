//! `conductor job` — Submit and inspect jobs.

use std::path::Path;

use conductor_core::models::{Job, JobStatus};
use conductor_core::state::AppState;
use conductor_core::workflow::{submit_workflow, SubmitOverrides};

use super::print_json;

/// Create a job from a workflow file. The engine picks it up on the next cycle.
pub async fn submit(
    state: &AppState,
    workflow_file: &str,
    model: Option<String>,
    repository: Option<String>,
) -> Result<Job, String> {
    let job = submit_workflow(
        state,
        Path::new(workflow_file),
        SubmitOverrides { model, repository },
    )
    .await
    .map_err(|e| format!("Failed to submit '{}': {}", workflow_file, e))?;

    print_json(&serde_json::json!({
        "jobId": job.id,
        "status": job.status.as_str(),
        "workflowType": job.workflow_shape.as_str(),
    }));
    Ok(job)
}

/// Jobs, newest first, optionally filtered by status.
pub async fn list(state: &AppState, status: Option<&str>) -> Result<Vec<Job>, String> {
    let filter = status
        .map(|s| {
            JobStatus::from_str(&s.to_ascii_uppercase())
                .ok_or_else(|| format!("Unknown status '{}'", s))
        })
        .transpose()?;

    let jobs: Vec<Job> = state
        .job_store
        .find_all()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|j| filter.map_or(true, |f| j.status == f))
        .collect();

    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(jobs);
    }
    for job in &jobs {
        println!(
            "{}  {:<9} {:<8} {}  {}{}",
            job.id,
            job.status.as_str(),
            job.workflow_shape.as_str(),
            job.created_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            job.workflow_path,
            job.bound_value
                .as_deref()
                .map(|v| format!("  [{}]", v))
                .unwrap_or_default(),
        );
    }
    Ok(jobs)
}

/// A job with its prompts and fan-out children.
pub async fn show(state: &AppState, job_id: &str) -> Result<(), String> {
    let (job, prompts) = state
        .job_store
        .find_with_details(job_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Job {} not found", job_id))?;
    let children = state
        .job_store
        .find_by_parent_id(job_id)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "job": job,
        "prompts": prompts,
        "children": children
            .iter()
            .map(|c| serde_json::json!({
                "id": c.id,
                "status": c.status.as_str(),
                "boundValue": c.bound_value,
                "branchIndex": c.branch_index,
            }))
            .collect::<Vec<_>>(),
    }));
    Ok(())
}

/// Print the remote agent's replies for a job.
pub async fn conversation(state: &AppState, job_id: &str) -> Result<(), String> {
    let job = state
        .job_store
        .find_by_id(job_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Job {} not found", job_id))?;
    let agent_id = job
        .remote_agent_id
        .ok_or_else(|| format!("Job {} has not been launched yet", job_id))?;

    let text = state
        .agents
        .conversation_content(&agent_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Delete a job, its prompts and its fan-out children. Remote agents are
/// deleted on a best-effort basis.
pub async fn delete(state: &AppState, job_id: &str) -> Result<(), String> {
    let job = state
        .job_store
        .find_by_id(job_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Job {} not found", job_id))?;

    let mut doomed = state
        .job_store
        .find_by_parent_id(job_id)
        .await
        .map_err(|e| e.to_string())?;
    doomed.push(job);

    for job in &doomed {
        if let Some(agent_id) = job.remote_agent_id.as_deref() {
            if let Err(e) = state.agents.delete(agent_id).await {
                tracing::warn!("[CLI] Could not delete remote agent {}: {}", agent_id, e);
            }
        }
        state
            .prompt_store
            .delete_by_job_id(&job.id)
            .await
            .map_err(|e| e.to_string())?;
        state
            .job_store
            .delete_by_id(&job.id)
            .await
            .map_err(|e| e.to_string())?;
    }

    println!("Deleted {} job(s).", doomed.len());
    Ok(())
}
