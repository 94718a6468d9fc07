//! Job submission: turn a workflow file into a persisted `LOCAL` job.

use std::path::Path;

use uuid::Uuid;

use super::parser::parse_file;
use crate::error::EngineError;
use crate::models::job::Job;
use crate::models::prompt::Prompt;
use crate::state::AppState;

/// Values that override what the workflow file declares.
#[derive(Debug, Clone, Default)]
pub struct SubmitOverrides {
    pub model: Option<String>,
    pub repository: Option<String>,
}

/// Parse `workflow_path`, create the job and one `UNKNOWN` prompt per
/// prompt in file order. The path is stored in absolute form.
pub async fn submit_workflow(
    state: &AppState,
    workflow_path: &Path,
    overrides: SubmitOverrides,
) -> Result<Job, EngineError> {
    let path = std::fs::canonicalize(workflow_path)?;
    let definition = parse_file(&path)?;

    let job = Job::new(
        Uuid::new_v4().to_string(),
        path.to_string_lossy().to_string(),
        overrides.model.unwrap_or_else(|| definition.model.clone()),
        overrides
            .repository
            .unwrap_or_else(|| definition.repository.clone()),
        definition.shape(),
    )
    .with_timeout(definition.timeout_millis)
    .with_fallback_src(definition.fallback_src.clone());
    let job = state.job_store.save(&job).await?;

    for (position, info) in definition.all_prompts().into_iter().enumerate() {
        let prompt = Prompt::new(
            Uuid::new_v4().to_string(),
            job.id.clone(),
            info.src.clone(),
            position as i64,
        );
        state.prompt_store.save(&prompt).await?;
    }

    tracing::info!(
        "[Submission] Job {} created for {} ({})",
        job.id,
        job.workflow_path,
        job.workflow_shape.as_str()
    );
    Ok(job)
}
