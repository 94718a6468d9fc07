//! Sequential prompt advancement.
//!
//! Prompts advance strictly in order with at most one `SENT` at a time: a
//! sent prompt settles from the remote status before the next one goes out.

use uuid::Uuid;

use super::content::infer_content_type;
use super::launcher::render_prompt;
use super::schema::{PromptInfo, WorkflowDefinition};
use crate::agent::RemoteStatus;
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus};
use crate::models::prompt::{Prompt, PromptStatus};
use crate::state::AppState;

/// Create the job's prompt rows from its definition if it has none yet.
pub async fn ensure_prompts(
    state: &AppState,
    job: &Job,
    definition: &WorkflowDefinition,
) -> Result<Vec<Prompt>, EngineError> {
    let existing = state.prompt_store.find_by_job_id(&job.id).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    tracing::info!("[PromptSender] Creating prompt rows for job {}", job.id);
    let mut created = Vec::new();
    for (position, info) in definition.all_prompts().into_iter().enumerate() {
        let prompt = Prompt::new(
            Uuid::new_v4().to_string(),
            job.id.clone(),
            info.src.clone(),
            position as i64,
        );
        created.push(state.prompt_store.save(&prompt).await?);
    }
    Ok(created)
}

pub struct PromptSender {
    state: AppState,
}

impl PromptSender {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Advance the job's prompts by one step given the remote status polled
    /// this cycle. Returns the job as it stands afterwards.
    pub async fn advance(
        &self,
        job: Job,
        prompts: &[Prompt],
        definition: &WorkflowDefinition,
        status: &RemoteStatus,
    ) -> Result<Job, EngineError> {
        for prompt in prompts {
            match prompt.status {
                PromptStatus::Completed => continue,
                PromptStatus::Failed | PromptStatus::Error => return Ok(job),
                PromptStatus::Sent => {
                    if status.is_success() {
                        self.state
                            .prompt_store
                            .save(&prompt.clone().with_status(PromptStatus::Completed))
                            .await?;
                        continue;
                    }
                    if status.is_failure() {
                        self.state
                            .prompt_store
                            .save(&prompt.clone().with_status(PromptStatus::Failed))
                            .await?;
                    }
                    return Ok(job);
                }
                PromptStatus::Unknown => {
                    if job.fallback_executed {
                        tracing::info!(
                            "[PromptSender] Job {} ran its fallback, not sending {}",
                            job.id,
                            prompt.src
                        );
                        return Ok(job);
                    }
                    return self.send(job, prompt, definition).await;
                }
            }
        }
        Ok(job)
    }

    async fn send(
        &self,
        job: Job,
        prompt: &Prompt,
        definition: &WorkflowDefinition,
    ) -> Result<Job, EngineError> {
        let Some(agent_id) = job.remote_agent_id.clone() else {
            return Err(EngineError::Internal(format!(
                "job {} has no remote agent to send {} to",
                job.id, prompt.src
            )));
        };

        let info = match definition.prompt_by_src(&prompt.src) {
            Some(info) => info.clone(),
            None => PromptInfo {
                src: prompt.src.clone(),
                content_type: infer_content_type(&prompt.src)?,
                bind_exp: None,
                bind_result_type: None,
            },
        };

        let sent = match render_prompt(&job.workflow_path, &info, job.bound_value.as_deref()) {
            Ok(content) => self
                .state
                .agents
                .follow_up(&agent_id, &content)
                .await
                .map_err(EngineError::from),
            Err(e) => Err(e),
        };

        match sent {
            Ok(follow_up_id) => {
                tracing::info!(
                    "[PromptSender] Sent {} to agent {} (job {}, follow-up {})",
                    prompt.src,
                    agent_id,
                    job.id,
                    follow_up_id
                );
                self.state
                    .prompt_store
                    .save(&prompt.clone().with_status(PromptStatus::Sent))
                    .await?;
                self.state
                    .job_store
                    .save(&job.with_status(JobStatus::Running))
                    .await
            }
            Err(e) => {
                tracing::error!(
                    "[PromptSender] Failed to send {} for job {}: {}",
                    prompt.src,
                    job.id,
                    e
                );
                self.state
                    .prompt_store
                    .save(&prompt.clone().with_status(PromptStatus::Error))
                    .await?;
                self.state
                    .job_store
                    .save(&job.with_status(JobStatus::Error))
                    .await
            }
        }
    }
}
