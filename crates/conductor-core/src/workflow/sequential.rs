//! Sequential workflow handler.
//!
//! Per cycle: launch if not launched (and stop), otherwise heal the timer,
//! run the fallback if the timeout is reached, poll the remote status and,
//! on success, advance the prompts. The job only becomes FINISHED after the
//! last prompt has settled.

use super::fallback::FallbackExecutor;
use super::launcher::AgentLauncher;
use super::parser::parse_file;
use super::prompt_sender::{ensure_prompts, PromptSender};
use super::schema::WorkflowDefinition;
use super::timeout::{check_timeout, TimeoutTracker};
use crate::agent::RemoteStatus;
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus};
use crate::models::prompt::PromptStatus;
use crate::state::AppState;

/// Persist the local status a remote status maps onto, if it changed.
pub(crate) async fn sync_status(
    state: &AppState,
    job: Job,
    status: &RemoteStatus,
) -> Result<Job, EngineError> {
    match status.to_job_status() {
        Some(mapped) if mapped != job.status => {
            tracing::info!(
                "[Poller] Job {} status {} -> {}",
                job.id,
                job.status.as_str(),
                mapped.as_str()
            );
            state.job_store.save(&job.with_status(mapped)).await
        }
        Some(_) => Ok(job),
        None => {
            tracing::warn!("[Poller] Job {} reported unknown remote status {:?}", job.id, status);
            Ok(job)
        }
    }
}

/// Poll the remote status. Read failures are transient and yield `None`.
pub(crate) async fn poll_status(state: &AppState, job: &Job, agent_id: &str) -> Option<RemoteStatus> {
    match state.agents.status(agent_id).await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(
                "[Poller] Status check failed for job {} (agent {}), retrying next cycle: {}",
                job.id,
                agent_id,
                e
            );
            None
        }
    }
}

pub struct SequentialHandler {
    state: AppState,
    launcher: AgentLauncher,
    sender: PromptSender,
    fallback: FallbackExecutor,
    timeouts: TimeoutTracker,
}

impl SequentialHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            launcher: AgentLauncher::new(state.clone()),
            sender: PromptSender::new(state.clone()),
            fallback: FallbackExecutor::new(state.clone()),
            timeouts: TimeoutTracker::new(state.job_store.clone()),
            state,
        }
    }

    pub async fn handle(&self, job: Job) -> Result<(), EngineError> {
        let definition = parse_file(&job.workflow_path)?;
        self.drive(job, &definition).await
    }

    /// One pass over a job whose definition is a sequence. Used for fan-out
    /// children too, with a definition synthesised from their branch.
    pub async fn drive(&self, job: Job, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        let prompts = ensure_prompts(&self.state, &job, definition).await?;

        let Some(agent_id) = job.remote_agent_id.clone() else {
            let launched = self.launcher.launch(job, definition).await?;
            if let Some(current) = self.state.job_store.find_by_id(&launched.id).await? {
                tracing::debug!(
                    "[SequentialHandler] Job {} is {} after launch",
                    current.id,
                    current.status.as_str()
                );
            }
            return Ok(());
        };

        let job = self.timeouts.reset_stale_start_time(job).await;
        if job.has_timeout() && !job.fallback_executed && !job.status.is_terminal() {
            let check = check_timeout(&job);
            if check.reached {
                self.fallback.execute_fallback(job, definition, check).await;
                return Ok(());
            }
        }

        let Some(status) = poll_status(&self.state, &job, &agent_id).await else {
            return Ok(());
        };
        if !status.is_success() {
            sync_status(&self.state, job, &status).await?;
            return Ok(());
        }

        // Prompts advance before the job may be stored as FINISHED.
        let job = self.sender.advance(job, &prompts, definition, &status).await?;
        self.finish_if_settled(job).await
    }

    /// Mark the job FINISHED once nothing is in flight and nothing is left to
    /// send. After a fallback, unsent prompts are abandoned.
    async fn finish_if_settled(&self, job: Job) -> Result<(), EngineError> {
        if job.status.is_terminal() {
            return Ok(());
        }
        let prompts = self.state.prompt_store.find_by_job_id(&job.id).await?;
        let in_flight = prompts.iter().any(|p| p.status == PromptStatus::Sent);
        let unsent = prompts.iter().any(|p| p.status == PromptStatus::Unknown);
        if in_flight || (unsent && !job.fallback_executed) {
            return Ok(());
        }

        tracing::info!(
            "[SequentialHandler] Job {} status {} -> FINISHED",
            job.id,
            job.status.as_str()
        );
        self.state
            .job_store
            .save(&job.with_status(JobStatus::Finished))
            .await?;
        Ok(())
    }
}
