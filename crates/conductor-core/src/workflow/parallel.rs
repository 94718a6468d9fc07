//! Parallel (fan-out parent) workflow handler.
//!
//! The parent runs the fan-out launch prompt like a one-prompt sequence.
//! When its agent finishes, the reply is extracted into a list and one child
//! job is created per (element, branch) pair. The parent then waits in
//! `WAITING` and settles from its children.

use uuid::Uuid;

use super::extractor::{bound_value_of, extract_results, ExtractionResult};
use super::fallback::FallbackExecutor;
use super::launcher::AgentLauncher;
use super::parser::parse_file;
use super::prompt_sender::ensure_prompts;
use super::schema::{FanOutBlock, WorkflowDefinition};
use super::sequential::{poll_status, sync_status};
use super::timeout::{check_timeout, TimeoutTracker};
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus, WorkflowShape};
use crate::models::prompt::{Prompt, PromptStatus};
use crate::state::AppState;

pub struct ParallelHandler {
    state: AppState,
    launcher: AgentLauncher,
    fallback: FallbackExecutor,
    timeouts: TimeoutTracker,
}

impl ParallelHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            launcher: AgentLauncher::new(state.clone()),
            fallback: FallbackExecutor::new(state.clone()),
            timeouts: TimeoutTracker::new(state.job_store.clone()),
            state,
        }
    }

    pub async fn handle(&self, job: Job) -> Result<(), EngineError> {
        let definition = parse_file(&job.workflow_path)?;
        let Some(block) = definition.parallel.clone() else {
            return Err(EngineError::Internal(format!(
                "{} has no <parallel> block",
                job.workflow_path
            )));
        };

        if job.status == JobStatus::Waiting {
            return self.wait_for_children(job, &definition, &block).await;
        }

        let prompts = ensure_prompts(&self.state, &job, &definition).await?;

        let Some(agent_id) = job.remote_agent_id.clone() else {
            self.launcher.launch(job, &definition).await?;
            return Ok(());
        };

        let job = self.timeouts.reset_stale_start_time(job).await;
        if self.fire_timeout(&job, &definition, &block).await? {
            return Ok(());
        }

        let Some(status) = poll_status(&self.state, &job, &agent_id).await else {
            return Ok(());
        };
        // On success the parent moves straight on to WAITING or ERROR.
        if !status.is_success() {
            sync_status(&self.state, job, &status).await?;
            return Ok(());
        }

        for prompt in prompts.iter().filter(|p| p.status == PromptStatus::Sent) {
            self.state
                .prompt_store
                .save(&prompt.clone().with_status(PromptStatus::Completed))
                .await?;
        }

        if !self.state.job_store.find_by_parent_id(&job.id).await?.is_empty() {
            self.state
                .job_store
                .save(&job.with_status(JobStatus::Waiting))
                .await?;
            return Ok(());
        }

        match extract_results(self.state.agents.as_ref(), &job, &block).await? {
            ExtractionResult::Elements(elements) => self.fan_out(job, &block, &elements).await,
            ExtractionResult::Failed(reason) => {
                tracing::error!("[ParallelHandler] Fan-out failed for job {}: {}", job.id, reason);
                self.state
                    .job_store
                    .save(&job.with_status(JobStatus::Error))
                    .await?;
                Ok(())
            }
        }
    }

    /// Returns `true` when the timeout fired and this cycle is done.
    async fn fire_timeout(
        &self,
        job: &Job,
        definition: &WorkflowDefinition,
        block: &FanOutBlock,
    ) -> Result<bool, EngineError> {
        if !job.has_timeout() || job.fallback_executed || job.status.is_terminal() {
            return Ok(false);
        }
        let check = check_timeout(job);
        if !check.reached {
            return Ok(false);
        }

        let has_children = !self.state.job_store.find_by_parent_id(&job.id).await?.is_empty();
        if has_children {
            self.fallback
                .execute_fallback_for_parallel_children(job.clone(), block)
                .await;
        } else {
            self.fallback
                .execute_fallback(job.clone(), definition, check)
                .await;
        }
        Ok(true)
    }

    async fn fan_out(
        &self,
        parent: Job,
        block: &FanOutBlock,
        elements: &[serde_json::Value],
    ) -> Result<(), EngineError> {
        let parent_id = parent.id.clone();
        let mut created = 0usize;
        for element in elements {
            let bound = bound_value_of(element);
            for (index, branch) in block.branches.iter().enumerate() {
                let child = Job::new(
                    Uuid::new_v4().to_string(),
                    parent.workflow_path.clone(),
                    branch.model.clone(),
                    branch.repository.clone(),
                    WorkflowShape::Sequence,
                )
                .with_parent(parent_id.clone(), index)
                .with_bound_value(Some(bound.clone()))
                .with_timeout(branch.timeout_millis)
                .with_fallback_src(branch.fallback_src.clone());
                let child = self.state.job_store.save(&child).await?;

                for (position, info) in branch.prompts.iter().enumerate() {
                    let prompt = Prompt::new(
                        Uuid::new_v4().to_string(),
                        child.id.clone(),
                        info.src.clone(),
                        position as i64,
                    );
                    self.state.prompt_store.save(&prompt).await?;
                }
                created += 1;
            }
        }

        let fan_out_result = serde_json::to_string(elements)
            .map_err(|e| EngineError::Internal(format!("Failed to serialize fan-out result: {}", e)))?;
        self.state
            .job_store
            .save(
                &parent
                    .with_fan_out_result(fan_out_result)
                    .with_status(JobStatus::Waiting),
            )
            .await?;

        tracing::info!(
            "[ParallelHandler] Job {} fanned out into {} children ({} elements x {} branches)",
            parent_id,
            created,
            elements.len(),
            block.branches.len()
        );
        Ok(())
    }

    async fn wait_for_children(
        &self,
        job: Job,
        definition: &WorkflowDefinition,
        block: &FanOutBlock,
    ) -> Result<(), EngineError> {
        let job = self.timeouts.reset_stale_start_time(job).await;
        if self.fire_timeout(&job, definition, block).await? {
            return Ok(());
        }

        let children = self.state.job_store.find_by_parent_id(&job.id).await?;
        if children
            .iter()
            .any(|c| matches!(c.status, JobStatus::Error | JobStatus::Expired))
        {
            tracing::warn!("[ParallelHandler] Job {} has a failed child", job.id);
            self.state
                .job_store
                .save(&job.with_status(JobStatus::Error))
                .await?;
        } else if !children.is_empty() && children.iter().all(|c| c.status == JobStatus::Finished) {
            tracing::info!(
                "[ParallelHandler] All {} children of job {} finished",
                children.len(),
                job.id
            );
            self.state
                .job_store
                .save(&job.with_status(JobStatus::Finished))
                .await?;
        }
        Ok(())
    }
}
