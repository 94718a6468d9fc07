//! Remote agent service boundary.
//!
//! The engine only talks to the remote coding-agent backend through the
//! [`AgentService`] trait. [`CloudAgentClient`] is the HTTP implementation;
//! tests plug in scripted in-process services.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::job::JobStatus;

pub use client::CloudAgentClient;

#[derive(Debug, thiserror::Error)]
pub enum AgentServiceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Status of a remote agent as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Creating,
    Running,
    Finished,
    Error,
    Expired,
    Unknown(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATING" => Self::Creating,
            "RUNNING" => Self::Running,
            "FINISHED" => Self::Finished,
            "ERROR" => Self::Error,
            "EXPIRED" => Self::Expired,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Expired)
    }

    /// Local status this remote status maps onto. `None` for statuses the
    /// engine does not recognise; the job keeps its current status then.
    pub fn to_job_status(&self) -> Option<JobStatus> {
        match self {
            Self::Creating => Some(JobStatus::Creating),
            Self::Running => Some(JobStatus::Running),
            Self::Finished => Some(JobStatus::Finished),
            Self::Error => Some(JobStatus::Error),
            Self::Expired => Some(JobStatus::Expired),
            Self::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default)]
    pub id: String,
    /// `user_message` or `assistant_message`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ConversationMessage {
    pub fn is_assistant(&self) -> bool {
        self.kind == "assistant_message"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    /// Assistant replies in order, separated by blank lines.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.is_assistant())
            .map(|m| m.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Operations the engine needs from the remote coding-agent service.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Launch a new remote agent and return its id.
    async fn launch(
        &self,
        content: &str,
        model: &str,
        repository: &str,
        is_sequence: bool,
    ) -> Result<String, AgentServiceError>;

    /// Send a follow-up prompt to an existing agent. Returns the follow-up id.
    async fn follow_up(&self, agent_id: &str, content: &str) -> Result<String, AgentServiceError>;

    async fn status(&self, agent_id: &str) -> Result<RemoteStatus, AgentServiceError>;

    async fn conversation(&self, agent_id: &str) -> Result<Conversation, AgentServiceError>;

    /// Plain-text view of the agent's replies.
    async fn conversation_content(&self, agent_id: &str) -> Result<String, AgentServiceError> {
        Ok(self.conversation(agent_id).await?.assistant_text())
    }

    async fn delete(&self, agent_id: &str) -> Result<(), AgentServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_mapping() {
        assert_eq!(RemoteStatus::parse("finished"), RemoteStatus::Finished);
        assert_eq!(
            RemoteStatus::parse("PAUSED"),
            RemoteStatus::Unknown("PAUSED".to_string())
        );
        assert!(RemoteStatus::Expired.is_failure());
        assert!(!RemoteStatus::Running.is_success());
        assert_eq!(RemoteStatus::Unknown("x".into()).to_job_status(), None);
        assert_eq!(
            RemoteStatus::Running.to_job_status(),
            Some(JobStatus::Running)
        );
    }

    #[test]
    fn test_assistant_text_skips_user_messages() {
        let conversation: Conversation = serde_json::from_str(
            r#"{"id":"bc-1","messages":[
                {"id":"1","type":"user_message","text":"list them"},
                {"id":"2","type":"assistant_message","text":"Working on it."},
                {"id":"3","type":"assistant_message","text":"[1, 2, 3]"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(conversation.assistant_text(), "Working on it.\n\n[1, 2, 3]");
    }
}
