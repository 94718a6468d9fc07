//! Fallback execution on timeout.
//!
//! A job's fallback runs at most once: `fallback_executed` is set together
//! with the remote call and is never cleared. Failures here end in the job's
//! `ERROR` state; persistence failures are logged and retried next cycle.

use super::content::infer_content_type;
use super::expression::CURRENT_VALUE_EXPRESSION;
use super::launcher::render_prompt;
use super::schema::{FanOutBlock, PromptInfo, WorkflowDefinition};
use super::timeout::{check_timeout, TimeoutCheck, TimeoutTracker};
use crate::models::job::{Job, JobStatus};
use crate::state::AppState;

pub struct FallbackExecutor {
    state: AppState,
    timeouts: TimeoutTracker,
}

impl FallbackExecutor {
    pub fn new(state: AppState) -> Self {
        let timeouts = TimeoutTracker::new(state.job_store.clone());
        Self { state, timeouts }
    }

    async fn persist(&self, original: Job, updated: Job) -> Job {
        match self.state.job_store.save(&updated).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("[Fallback] Failed to persist job {}: {}", original.id, e);
                original
            }
        }
    }

    async fn fail(&self, job: Job) -> Job {
        let failed = job.clone().with_status(JobStatus::Error);
        self.persist(job, failed).await
    }

    /// Run the job's fallback prompt once. Sent as a follow-up when the job
    /// has a remote agent, otherwise launched as a fresh agent.
    pub async fn execute_fallback(
        &self,
        job: Job,
        definition: &WorkflowDefinition,
        check: TimeoutCheck,
    ) -> Job {
        if job.status.is_terminal() || job.fallback_executed {
            return job;
        }

        let Some(src) = job
            .fallback_src
            .clone()
            .or_else(|| definition.fallback_src.clone())
        else {
            tracing::warn!(
                "[Fallback] Job {} timed out after {}ms (limit {:?}ms) with no fallback configured",
                job.id,
                check.elapsed_millis,
                check.timeout_millis
            );
            return self.fail(job).await;
        };

        tracing::info!(
            "[Fallback] Job {} timed out after {}ms (limit {:?}ms), running fallback {}",
            job.id,
            check.elapsed_millis,
            check.timeout_millis,
            src
        );

        let info = match infer_content_type(&src) {
            Ok(content_type) => PromptInfo {
                src: src.clone(),
                content_type,
                bind_exp: Some(CURRENT_VALUE_EXPRESSION.to_string()),
                bind_result_type: None,
            },
            Err(e) => {
                tracing::error!("[Fallback] Invalid fallback {} for job {}: {}", src, job.id, e);
                return self.fail(job).await;
            }
        };
        let content = match render_prompt(&job.workflow_path, &info, job.bound_value.as_deref()) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("[Fallback] Cannot read fallback for job {}: {}", job.id, e);
                return self.fail(job).await;
            }
        };

        match job.remote_agent_id.clone() {
            Some(agent_id) => match self.state.agents.follow_up(&agent_id, &content).await {
                Ok(_) => {
                    let updated = job
                        .clone()
                        .with_fallback_executed()
                        .with_status(JobStatus::Running);
                    self.persist(job, updated).await
                }
                Err(e) => {
                    tracing::error!("[Fallback] Follow-up failed for job {}: {}", job.id, e);
                    self.fail(job).await
                }
            },
            None => {
                let model = if job.model.is_empty() { &definition.model } else { &job.model };
                let repository = if job.repository.is_empty() {
                    &definition.repository
                } else {
                    &job.repository
                };
                match self
                    .state
                    .agents
                    .launch(&content, model, repository, true)
                    .await
                {
                    Ok(agent_id) => {
                        let updated = job
                            .clone()
                            .with_remote_agent_id(agent_id)
                            .with_fallback_executed()
                            .with_status(JobStatus::Creating);
                        let saved = self.persist(job, updated).await;
                        self.timeouts.reset_start_time_if_needed(saved).await
                    }
                    Err(e) => {
                        tracing::error!("[Fallback] Launch failed for job {}: {}", job.id, e);
                        self.fail(job).await
                    }
                }
            }
        }
    }

    /// Run the fallback for every fan-out child still in progress, then
    /// mark the parent so the sweep is not repeated.
    pub async fn execute_fallback_for_parallel_children(
        &self,
        parent: Job,
        block: &FanOutBlock,
    ) -> Job {
        if parent.fallback_executed {
            return parent;
        }
        let any_fallback = parent.fallback_src.is_some()
            || block.fallback_src.is_some()
            || block.branches.iter().any(|b| b.fallback_src.is_some());
        if !any_fallback {
            tracing::warn!(
                "[Fallback] Parallel job {} timed out with no fallback configured",
                parent.id
            );
            return self.fail(parent).await;
        }

        let children = match self.state.job_store.find_by_parent_id(&parent.id).await {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!("[Fallback] Cannot load children of {}: {}", parent.id, e);
                return parent;
            }
        };

        let mut swept = 0usize;
        for child in children {
            if child.status.is_terminal() || child.fallback_executed {
                continue;
            }
            let branch = child
                .branch_index
                .and_then(|i| block.branches.get(i as usize));
            let Some(definition) = branch.and_then(|b| WorkflowDefinition::from_branch(b, block))
            else {
                tracing::warn!("[Fallback] Child {} has no branch definition", child.id);
                continue;
            };
            let child = if child.fallback_src.is_none() {
                child.with_fallback_src(
                    definition
                        .fallback_src
                        .clone()
                        .or_else(|| parent.fallback_src.clone()),
                )
            } else {
                child
            };
            let check = check_timeout(&child);
            self.execute_fallback(child, &definition, check).await;
            swept += 1;
        }

        tracing::info!(
            "[Fallback] Parallel job {} ran fallback for {} children",
            parent.id,
            swept
        );
        let updated = parent.clone().with_fallback_executed();
        self.persist(parent, updated).await
    }
}
