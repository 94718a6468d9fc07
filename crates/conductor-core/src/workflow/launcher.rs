//! Agent launcher: starts the remote agent for a job.

use super::content::{read_prompt_file, to_plain_text};
use super::expression::{evaluate, replace_input_placeholder};
use super::schema::{ContentType, PromptInfo, WorkflowDefinition};
use super::timeout::TimeoutTracker;
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus, WorkflowShape};
use crate::models::prompt::PromptStatus;
use crate::state::AppState;

/// Read a prompt and prepare it for sending. PML content is converted to
/// plain text and receives the bound value; markdown and text are sent as
/// they are.
pub fn render_prompt(
    workflow_path: &str,
    info: &PromptInfo,
    bound_value: Option<&str>,
) -> Result<String, EngineError> {
    let raw = read_prompt_file(workflow_path, &info.src)?;
    if info.content_type != ContentType::Pml {
        return Ok(raw);
    }

    let text = to_plain_text(&raw);
    match (bound_value, evaluate(info.bind_exp.as_deref(), bound_value)) {
        (Some(_), Some(value)) => Ok(replace_input_placeholder(&text, Some(&value))),
        _ => Ok(text),
    }
}

pub struct AgentLauncher {
    state: AppState,
    timeouts: TimeoutTracker,
}

impl AgentLauncher {
    pub fn new(state: AppState) -> Self {
        let timeouts = TimeoutTracker::new(state.job_store.clone());
        Self { state, timeouts }
    }

    /// Launch the job's remote agent with the definition's launch prompt.
    ///
    /// A failed launch moves the job to `ERROR`; it is not retried.
    pub async fn launch(&self, job: Job, definition: &WorkflowDefinition) -> Result<Job, EngineError> {
        let content = match render_prompt(&job.workflow_path, &definition.launch, job.bound_value.as_deref()) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("[Launcher] Cannot read launch prompt for job {}: {}", job.id, e);
                return self.state.job_store.save(&job.with_status(JobStatus::Error)).await;
            }
        };

        let model = if job.model.is_empty() { &definition.model } else { &job.model };
        let repository = if job.repository.is_empty() {
            &definition.repository
        } else {
            &job.repository
        };
        let is_sequence = definition.shape() == WorkflowShape::Sequence;

        let agent_id = match self
            .state
            .agents
            .launch(&content, model, repository, is_sequence)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("[Launcher] Launch failed for job {}: {}", job.id, e);
                return self.state.job_store.save(&job.with_status(JobStatus::Error)).await;
            }
        };

        tracing::info!("[Launcher] Job {} launched as remote agent {}", job.id, agent_id);
        let job = self
            .state
            .job_store
            .save(
                &job.with_remote_agent_id(agent_id)
                    .with_status(JobStatus::Creating),
            )
            .await?;
        let job = self.timeouts.reset_start_time_if_needed(job).await;

        self.mark_launch_prompt_sent(&job.id).await?;
        Ok(job)
    }

    async fn mark_launch_prompt_sent(&self, job_id: &str) -> Result<(), EngineError> {
        let prompts = self.state.prompt_store.find_by_job_id(job_id).await?;
        if let Some(first) = prompts
            .into_iter()
            .next()
            .filter(|p| p.status == PromptStatus::Unknown)
        {
            self.state
                .prompt_store
                .save(&first.with_status(PromptStatus::Sent))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(src: &str, content_type: ContentType, bind: bool) -> PromptInfo {
        PromptInfo {
            src: src.to_string(),
            content_type,
            bind_exp: bind.then(|| "get-current-value".to_string()),
            bind_result_type: None,
        }
    }

    #[test]
    fn test_render_prompt_substitutes_only_pml() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = dir.path().join("workflow.xml");
        std::fs::write(dir.path().join("p.xml"), "<prompt><task>Fix issue ${input}</task></prompt>").unwrap();
        std::fs::write(dir.path().join("p.md"), "Fix issue ${input}").unwrap();
        let wf = workflow.to_string_lossy().to_string();

        let pml = render_prompt(&wf, &info("p.xml", ContentType::Pml, true), Some("12")).unwrap();
        assert_eq!(pml, "## Task\nFix issue 12");

        let md = render_prompt(&wf, &info("p.md", ContentType::Markdown, true), Some("12")).unwrap();
        assert_eq!(md, "Fix issue ${input}");

        let unbound = render_prompt(&wf, &info("p.xml", ContentType::Pml, false), Some("12")).unwrap();
        assert_eq!(unbound, "## Task\nFix issue ${input}");

        assert!(render_prompt(&wf, &info("missing.xml", ContentType::Pml, false), None).is_err());
    }
}
