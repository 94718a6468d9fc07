use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local job status. Remote statuses map onto it 1:1 once a job is launched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    /// Created, no remote agent yet
    #[serde(rename = "LOCAL")]
    Local,
    /// Launched, remote agent still being provisioned
    #[serde(rename = "CREATING")]
    Creating,
    #[serde(rename = "RUNNING")]
    Running,
    /// Parallel parent whose fan-out children are still in progress
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Creating => "CREATING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOCAL" => Some(Self::Local),
            "CREATING" => Some(Self::Creating),
            "RUNNING" => Some(Self::Running),
            "WAITING" => Some(Self::Waiting),
            "FINISHED" => Some(Self::Finished),
            "ERROR" => Some(Self::Error),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Expired)
    }

    /// Statuses excluded from the unfinished-jobs query.
    pub fn terminal() -> [JobStatus; 3] {
        [Self::Finished, Self::Error, Self::Expired]
    }
}

/// Declared shape of a job's workflow. Legacy jobs carry no shape and are
/// classified by probing the workflow file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowShape {
    #[serde(rename = "SEQUENCE")]
    Sequence,
    #[serde(rename = "PARALLEL")]
    Parallel,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl WorkflowShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "SEQUENCE",
            Self::Parallel => "PARALLEL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Stored column value; `Unknown` is persisted as NULL.
    pub fn to_column(&self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            other => Some(other.as_str()),
        }
    }

    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("SEQUENCE") => Self::Sequence,
            Some("PARALLEL") => Self::Parallel,
            _ => Self::Unknown,
        }
    }
}

/// A unit of orchestrated work bound to one workflow definition file.
///
/// Jobs are treated as immutable values: every transition goes through one
/// of the `with_*` builders and is persisted with a single `JobStore::save`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub workflow_path: String,
    pub model: String,
    pub repository: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_value: Option<String>,
    pub workflow_shape: WorkflowShape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_src: Option<String>,
    pub fallback_executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_out_result: Option<String>,
    /// Index of the fan-out branch a child job runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<i64>,
}

impl Job {
    pub fn new(
        id: String,
        workflow_path: String,
        model: String,
        repository: String,
        workflow_shape: WorkflowShape,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_path,
            model,
            repository,
            status: JobStatus::Local,
            created_at: now,
            updated_at: now,
            remote_agent_id: None,
            parent_job_id: None,
            bound_value: None,
            workflow_shape,
            timeout_millis: None,
            workflow_start_time: None,
            fallback_src: None,
            fallback_executed: false,
            fan_out_result: None,
            branch_index: None,
        }
    }

    pub fn has_timeout(&self) -> bool {
        self.timeout_millis.is_some()
    }

    pub fn is_child(&self) -> bool {
        self.parent_job_id.is_some()
    }

    fn touched(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self.touched()
    }

    /// Set the remote agent id. An id that is already set is never replaced.
    pub fn with_remote_agent_id(mut self, agent_id: String) -> Self {
        if self.remote_agent_id.is_none() {
            self.remote_agent_id = Some(agent_id);
        }
        self.touched()
    }

    pub fn with_parent(mut self, parent_job_id: String, branch_index: usize) -> Self {
        self.parent_job_id = Some(parent_job_id);
        self.branch_index = Some(branch_index as i64);
        self.touched()
    }

    pub fn with_bound_value(mut self, value: Option<String>) -> Self {
        self.bound_value = value;
        self.touched()
    }

    pub fn with_shape(mut self, shape: WorkflowShape) -> Self {
        self.workflow_shape = shape;
        self.touched()
    }

    pub fn with_timeout(mut self, timeout_millis: Option<i64>) -> Self {
        self.timeout_millis = timeout_millis;
        self.touched()
    }

    pub fn with_fallback_src(mut self, fallback_src: Option<String>) -> Self {
        self.fallback_src = fallback_src;
        self.touched()
    }

    pub fn with_workflow_start_time(mut self, at: DateTime<Utc>) -> Self {
        self.workflow_start_time = Some(at);
        self.touched()
    }

    /// Mark the fallback as executed. There is no way back to `false`.
    pub fn with_fallback_executed(mut self) -> Self {
        self.fallback_executed = true;
        self.touched()
    }

    pub fn with_fan_out_result(mut self, json: String) -> Self {
        self.fan_out_result = Some(json);
        self.touched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "job-1".to_string(),
            "/tmp/wf.xml".to_string(),
            "model".to_string(),
            "https://github.com/o/r".to_string(),
            WorkflowShape::Sequence,
        )
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            JobStatus::Local,
            JobStatus::Creating,
            JobStatus::Running,
            JobStatus::Waiting,
            JobStatus::Finished,
            JobStatus::Error,
            JobStatus::Expired,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
        assert!(!JobStatus::Waiting.is_terminal());
        assert_eq!(JobStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_remote_agent_id_is_set_once() {
        let job = job()
            .with_remote_agent_id("bc-1".to_string())
            .with_remote_agent_id("bc-2".to_string());
        assert_eq!(job.remote_agent_id.as_deref(), Some("bc-1"));
    }

    #[test]
    fn test_unknown_shape_is_stored_as_null() {
        assert_eq!(WorkflowShape::Unknown.to_column(), None);
        assert_eq!(WorkflowShape::from_column(None), WorkflowShape::Unknown);
        assert_eq!(
            WorkflowShape::from_column(Some("PARALLEL")),
            WorkflowShape::Parallel
        );
    }
}
