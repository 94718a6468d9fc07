use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PromptStatus {
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "SENT")]
    Sent,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "ERROR")]
    Error,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Sent => "SENT",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(Self::Unknown),
            "SENT" => Some(Self::Sent),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error)
    }
}

/// One step within a job's sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub job_id: String,
    pub src: String,
    /// Position within the job's sequence (0 = launch prompt)
    pub position: i64,
    pub status: PromptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(id: String, job_id: String, src: String, position: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_id,
            src,
            position,
            status: PromptStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: PromptStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }
}
