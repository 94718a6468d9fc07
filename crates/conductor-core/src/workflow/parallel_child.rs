//! Fan-out child handler.
//!
//! A child runs its branch of the parent's `<parallel>` block as a plain
//! sequence. It owns its remote agent, timeout clock and fallback flag.

use super::parser::parse_file;
use super::schema::WorkflowDefinition;
use super::sequential::SequentialHandler;
use crate::error::EngineError;
use crate::models::job::Job;
use crate::state::AppState;

pub struct ParallelChildHandler {
    state: AppState,
    sequential: SequentialHandler,
}

impl ParallelChildHandler {
    pub fn new(state: AppState) -> Self {
        Self {
            sequential: SequentialHandler::new(state.clone()),
            state,
        }
    }

    /// Definition of the branch this child runs.
    pub fn branch_definition(job: &Job) -> Result<WorkflowDefinition, EngineError> {
        let definition = parse_file(&job.workflow_path)?;
        let block = definition.parallel.as_ref().ok_or_else(|| {
            EngineError::Internal(format!("{} has no <parallel> block", job.workflow_path))
        })?;
        let index = job
            .branch_index
            .ok_or_else(|| EngineError::Internal(format!("child job {} has no branch index", job.id)))?;
        block
            .branches
            .get(index as usize)
            .and_then(|branch| WorkflowDefinition::from_branch(branch, block))
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "child job {} refers to missing branch {}",
                    job.id, index
                ))
            })
    }

    pub async fn handle(&self, job: Job) -> Result<(), EngineError> {
        let definition = Self::branch_definition(&job)?;

        // Branch without its own timeout/fallback: take the block's before launch.
        let job = if job.remote_agent_id.is_none()
            && ((job.timeout_millis.is_none() && definition.timeout_millis.is_some())
                || (job.fallback_src.is_none() && definition.fallback_src.is_some()))
        {
            let timeout = job.timeout_millis.or(definition.timeout_millis);
            let fallback = job.fallback_src.clone().or_else(|| definition.fallback_src.clone());
            self.state
                .job_store
                .save(&job.with_timeout(timeout).with_fallback_src(fallback))
                .await?
        } else {
            job
        };

        self.sequential.drive(job, &definition).await
    }
}
