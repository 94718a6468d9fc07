//! Result extraction for fan-out.
//!
//! Turns the remote agent's free-text reply into the list that drives a
//! parallel job's children. The reply may be a bare JSON array, an array in
//! a fenced code block, or an array embedded somewhere in prose.

use regex::Regex;
use serde_json::Value;

use super::schema::FanOutBlock;
use crate::agent::AgentService;
use crate::error::EngineError;
use crate::models::job::Job;

const LIST_PREFIX: &str = "List_";

/// Outcome of a fan-out extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Elements(Vec<Value>),
    Failed(String),
}

/// Element types the engine can drive fan-out with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Integer,
}

impl ElementType {
    /// Map a declared `bindResultType`. Declarations that are absent or not
    /// list-shaped yield `Ok(None)`; an unknown list element type is an error.
    pub fn from_declared(declared: Option<&str>) -> Result<Option<Self>, EngineError> {
        let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        let Some(element) = declared.strip_prefix(LIST_PREFIX) else {
            return Ok(None);
        };
        match element {
            "Integer" => Ok(Some(Self::Integer)),
            other => Err(EngineError::UnsupportedType(format!("{}{}", LIST_PREFIX, other))),
        }
    }

    fn parse(&self, candidate: &str) -> Option<Vec<Value>> {
        match self {
            Self::Integer => serde_json::from_str::<Vec<i64>>(candidate.trim())
                .ok()
                .map(|v| v.into_iter().map(Value::from).collect()),
        }
    }
}

/// String form a fan-out element takes as a child's bound value.
pub fn bound_value_of(element: &Value) -> String {
    match element {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fetch the conversation of a finished parallel job and parse it.
pub async fn extract_results(
    agents: &dyn AgentService,
    job: &Job,
    block: &FanOutBlock,
) -> Result<ExtractionResult, EngineError> {
    let Some(element_type) = ElementType::from_declared(block.result_type())? else {
        return Ok(ExtractionResult::Failed(format!(
            "no list result type declared on {}",
            block.launch.src
        )));
    };
    let Some(agent_id) = job.remote_agent_id.as_deref() else {
        return Ok(ExtractionResult::Failed("job has no remote agent".to_string()));
    };

    let text = match agents.conversation_content(agent_id).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                "[Extractor] Failed to fetch conversation for job {}: {}",
                job.id,
                e
            );
            return Ok(ExtractionResult::Failed(e.to_string()));
        }
    };

    Ok(parse_elements(&text, element_type))
}

pub fn parse_elements(text: &str, element_type: ElementType) -> ExtractionResult {
    let parsed = element_type
        .parse(text)
        .or_else(|| {
            fenced_blocks(text)
                .into_iter()
                .rev()
                .find_map(|block| element_type.parse(&block))
        })
        .or_else(|| last_bracketed(text).and_then(|span| element_type.parse(span)));

    match parsed {
        Some(elements) if elements.is_empty() => {
            ExtractionResult::Failed("extracted list is empty".to_string())
        }
        Some(elements) => ExtractionResult::Elements(elements),
        None => ExtractionResult::Failed("no JSON array found in conversation".to_string()),
    }
}

fn fenced_blocks(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```") else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// The last balanced `[...]` span in the text.
fn last_bracketed(text: &str) -> Option<&str> {
    let end = text.rfind(']')?;
    let mut depth = 0usize;
    for (i, ch) in text[..=end].char_indices().rev() {
        match ch {
            ']' => depth += 1,
            '[' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[i..=end]);
                }
            }
            _ => {}
        }
    }
    None
}
