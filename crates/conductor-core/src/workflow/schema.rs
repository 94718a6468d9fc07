//! In-memory types for workflow definitions.
//!
//! A workflow file declares either a sequence of prompts sent to one remote
//! agent, or a parallel fan-out whose launch prompt produces a list that is
//! multiplied across branch sequences:
//!
//! ```xml
//! <workflow>
//!   <parallel model="m" repository="https://github.com/o/r" timeout="20m" fallback-src="fb.xml">
//!     <prompt src="list.xml" bindResultType="List_Integer"/>
//!     <sequence model="m" repository="https://github.com/o/r" timeout="5m">
//!       <prompt src="child.xml" bindExp="get-current-value"/>
//!     </sequence>
//!   </parallel>
//! </workflow>
//! ```

use serde::{Deserialize, Serialize};

use crate::models::job::WorkflowShape;

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Failed to read workflow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed workflow XML: {0}")]
    Xml(String),

    #[error("Missing <workflow> root element")]
    MissingRoot,

    #[error("Workflow must contain exactly one <sequence> or <parallel> block, found {0}")]
    AmbiguousShape(usize),

    #[error("No prompts in {0}")]
    NoPrompts(String),

    #[error("Missing or empty attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Cannot determine content type of '{0}'")]
    UnknownContentType(String),

    #[error("Invalid timeout '{0}'")]
    InvalidTimeout(String),
}

/// Format of a prompt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Structured prompt markup, converted to plain text before sending
    Pml,
    Markdown,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pml => "pml",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pml" | "xml" => Some(Self::Pml),
            "markdown" | "md" => Some(Self::Markdown),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// One `<prompt>` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    pub src: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_exp: Option<String>,
    /// Declared element type of the list this prompt produces (fan-out only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_result_type: Option<String>,
}

/// One fan-out branch: a sequence run once per extracted element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDefinition {
    pub model: String,
    pub repository: String,
    pub prompts: Vec<PromptInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_src: Option<String>,
}

/// The `<parallel>` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutBlock {
    pub launch: PromptInfo,
    pub branches: Vec<BranchDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_src: Option<String>,
}

impl FanOutBlock {
    pub fn result_type(&self) -> Option<&str> {
        self.launch.bind_result_type.as_deref()
    }
}

/// Parsed, immutable view of a workflow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub launch: PromptInfo,
    pub model: String,
    pub repository: String,
    /// Prompts sent after the launch prompt, in file order (sequence only)
    pub follow_ups: Vec<PromptInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<FanOutBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_src: Option<String>,
}

impl WorkflowDefinition {
    pub fn shape(&self) -> WorkflowShape {
        if self.parallel.is_some() {
            WorkflowShape::Parallel
        } else {
            WorkflowShape::Sequence
        }
    }

    /// Launch prompt followed by the follow-ups: one Prompt row each.
    pub fn all_prompts(&self) -> Vec<&PromptInfo> {
        std::iter::once(&self.launch)
            .chain(self.follow_ups.iter())
            .collect()
    }

    /// Look up a prompt by source file name.
    pub fn prompt_by_src(&self, src: &str) -> Option<&PromptInfo> {
        self.all_prompts().into_iter().find(|p| p.src == src)
    }

    /// A fan-out branch run as a plain sequence. Timeout and fallback come
    /// from the branch, or from the fan-out block when the branch has none.
    pub fn from_branch(branch: &BranchDefinition, block: &FanOutBlock) -> Option<Self> {
        let (launch, follow_ups) = branch.prompts.split_first()?;
        Some(Self {
            launch: launch.clone(),
            model: branch.model.clone(),
            repository: branch.repository.clone(),
            follow_ups: follow_ups.to_vec(),
            parallel: None,
            timeout_millis: branch.timeout_millis.or(block.timeout_millis),
            fallback_src: branch
                .fallback_src
                .clone()
                .or_else(|| block.fallback_src.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(src: &str) -> PromptInfo {
        PromptInfo {
            src: src.to_string(),
            content_type: ContentType::Pml,
            bind_exp: None,
            bind_result_type: None,
        }
    }

    #[test]
    fn test_branch_inherits_block_fallback() {
        let branch = BranchDefinition {
            model: "m".into(),
            repository: "r".into(),
            prompts: vec![prompt("a.xml"), prompt("b.xml")],
            timeout_millis: Some(5_000),
            fallback_src: None,
        };
        let block = FanOutBlock {
            launch: prompt("list.xml"),
            branches: vec![branch.clone()],
            timeout_millis: Some(60_000),
            fallback_src: Some("fb.xml".into()),
        };

        let def = WorkflowDefinition::from_branch(&branch, &block).unwrap();
        assert_eq!(def.shape(), WorkflowShape::Sequence);
        assert_eq!(def.launch.src, "a.xml");
        assert_eq!(def.follow_ups.len(), 1);
        assert_eq!(def.timeout_millis, Some(5_000));
        assert_eq!(def.fallback_src.as_deref(), Some("fb.xml"));
        assert!(def.prompt_by_src("b.xml").is_some());
    }

    #[test]
    fn test_content_type_from_str() {
        assert_eq!(ContentType::from_str("md"), Some(ContentType::Markdown));
        assert_eq!(ContentType::from_str("PML"), Some(ContentType::Pml));
        assert_eq!(ContentType::from_str("yaml"), None);
    }
}
