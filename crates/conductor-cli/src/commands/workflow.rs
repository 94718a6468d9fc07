//! `conductor workflow` — Inspect workflow files.

use serde::Serialize;

use conductor_core::workflow::{parse_file, WorkflowDefinition};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub file: String,
    pub shape: String,
    pub prompt_count: usize,
    pub branch_count: usize,
    pub definition: WorkflowDefinition,
}

/// Fully parse a workflow file and report its shape.
pub async fn validate(workflow_file: &str) -> Result<ValidationReport, String> {
    let definition =
        parse_file(workflow_file).map_err(|e| format!("{}: {}", workflow_file, e))?;

    let branch_count = definition
        .parallel
        .as_ref()
        .map_or(0, |block| block.branches.len());
    let prompt_count = definition.all_prompts().len()
        + definition
            .parallel
            .as_ref()
            .map_or(0, |block| block.branches.iter().map(|b| b.prompts.len()).sum());

    let report = ValidationReport {
        file: workflow_file.to_string(),
        shape: definition.shape().as_str().to_string(),
        prompt_count,
        branch_count,
        definition,
    };
    let value = serde_json::to_value(&report).map_err(|e| e.to_string())?;
    super::print_json(&value);
    Ok(report)
}
