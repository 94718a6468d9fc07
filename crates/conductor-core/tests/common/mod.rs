//! Shared fixtures for the engine integration tests: a scripted in-process
//! agent service and a temp workflow directory backed by in-memory SQLite.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conductor_core::agent::{AgentService, AgentServiceError, Conversation, ConversationMessage, RemoteStatus};
use conductor_core::models::{Job, Prompt};
use conductor_core::state::{AppState, AppStateInner};
use conductor_core::workflow::{submit_workflow, Poller, SubmitOverrides};
use conductor_core::Database;
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct LaunchCall {
    pub agent_id: String,
    pub content: String,
    pub model: String,
    pub repository: String,
    pub is_sequence: bool,
}

#[derive(Debug, Clone)]
pub struct FollowUpCall {
    pub agent_id: String,
    pub content: String,
}

struct MockInner {
    next_id: usize,
    default_status: RemoteStatus,
    statuses: HashMap<String, RemoteStatus>,
    conversations: HashMap<String, String>,
    launches: Vec<LaunchCall>,
    follow_ups: Vec<FollowUpCall>,
    status_calls: usize,
    fail_launch: bool,
    fail_follow_up: bool,
    crash_on_follow_up: bool,
    fail_status: bool,
}

/// Agent service with scripted statuses and recorded calls.
pub struct MockAgentService {
    inner: Mutex<MockInner>,
}

impl Default for MockAgentService {
    fn default() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                next_id: 0,
                default_status: RemoteStatus::Running,
                statuses: HashMap::new(),
                conversations: HashMap::new(),
                launches: Vec::new(),
                follow_ups: Vec::new(),
                status_calls: 0,
                fail_launch: false,
                fail_follow_up: false,
                crash_on_follow_up: false,
                fail_status: false,
            }),
        }
    }
}

impl MockAgentService {
    pub fn set_status(&self, agent_id: &str, status: RemoteStatus) {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .insert(agent_id.to_string(), status);
    }

    pub fn set_default_status(&self, status: RemoteStatus) {
        self.inner.lock().unwrap().default_status = status;
    }

    pub fn set_conversation(&self, agent_id: &str, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .conversations
            .insert(agent_id.to_string(), text.to_string());
    }

    pub fn fail_launch(&self, fail: bool) {
        self.inner.lock().unwrap().fail_launch = fail;
    }

    pub fn fail_follow_up(&self, fail: bool) {
        self.inner.lock().unwrap().fail_follow_up = fail;
    }

    /// Make `follow_up` panic, standing in for the process dying mid-cycle.
    pub fn crash_on_follow_up(&self, crash: bool) {
        self.inner.lock().unwrap().crash_on_follow_up = crash;
    }

    pub fn fail_status(&self, fail: bool) {
        self.inner.lock().unwrap().fail_status = fail;
    }

    pub fn launches(&self) -> Vec<LaunchCall> {
        self.inner.lock().unwrap().launches.clone()
    }

    pub fn follow_ups(&self) -> Vec<FollowUpCall> {
        self.inner.lock().unwrap().follow_ups.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.inner.lock().unwrap().status_calls
    }

    /// Total number of remote calls of any kind.
    pub fn total_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.launches.len() + inner.follow_ups.len() + inner.status_calls
    }
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn launch(
        &self,
        content: &str,
        model: &str,
        repository: &str,
        is_sequence: bool,
    ) -> Result<String, AgentServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_launch {
            return Err(AgentServiceError::Status {
                code: 500,
                body: "launch refused".to_string(),
            });
        }
        inner.next_id += 1;
        let agent_id = format!("bc-{}", inner.next_id);
        inner.launches.push(LaunchCall {
            agent_id: agent_id.clone(),
            content: content.to_string(),
            model: model.to_string(),
            repository: repository.to_string(),
            is_sequence,
        });
        Ok(agent_id)
    }

    async fn follow_up(&self, agent_id: &str, content: &str) -> Result<String, AgentServiceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.crash_on_follow_up {
            drop(inner);
            panic!("agent service crashed while sending a follow-up");
        }
        if inner.fail_follow_up {
            return Err(AgentServiceError::Http("connection reset".to_string()));
        }
        inner.follow_ups.push(FollowUpCall {
            agent_id: agent_id.to_string(),
            content: content.to_string(),
        });
        Ok(format!("fu-{}", inner.follow_ups.len()))
    }

    async fn status(&self, agent_id: &str) -> Result<RemoteStatus, AgentServiceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_calls += 1;
        if inner.fail_status {
            return Err(AgentServiceError::Http("timed out".to_string()));
        }
        Ok(inner
            .statuses
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| inner.default_status.clone()))
    }

    async fn conversation(&self, agent_id: &str) -> Result<Conversation, AgentServiceError> {
        let inner = self.inner.lock().unwrap();
        let text = inner
            .conversations
            .get(agent_id)
            .cloned()
            .ok_or_else(|| AgentServiceError::Status {
                code: 404,
                body: "no conversation".to_string(),
            })?;
        Ok(Conversation {
            id: agent_id.to_string(),
            messages: vec![
                ConversationMessage {
                    id: "m1".to_string(),
                    kind: "user_message".to_string(),
                    text: "please list them".to_string(),
                },
                ConversationMessage {
                    id: "m2".to_string(),
                    kind: "assistant_message".to_string(),
                    text,
                },
            ],
        })
    }

    async fn delete(&self, _agent_id: &str) -> Result<(), AgentServiceError> {
        Ok(())
    }
}

/// A temp workflow directory, an in-memory store and a poller wired to a mock.
pub struct TestEnv {
    pub dir: TempDir,
    pub state: AppState,
    pub mock: Arc<MockAgentService>,
    pub poller: Poller,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mock = Arc::new(MockAgentService::default());
        let db = Database::open_in_memory().expect("in-memory database");
        let state: AppState = Arc::new(AppStateInner::new(db, mock.clone()));
        let poller = Poller::new(state.clone());
        Self {
            dir,
            state,
            mock,
            poller,
        }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    pub async fn submit(&self, workflow: &str) -> Job {
        let path = self.write("workflow.xml", workflow);
        submit_workflow(&self.state, &path, SubmitOverrides::default())
            .await
            .expect("submit workflow")
    }

    pub async fn job(&self, id: &str) -> Job {
        self.state
            .job_store
            .find_by_id(id)
            .await
            .expect("find job")
            .expect("job exists")
    }

    pub async fn prompts(&self, job_id: &str) -> Vec<Prompt> {
        self.state
            .prompt_store
            .find_by_job_id(job_id)
            .await
            .expect("find prompts")
    }

    pub async fn children(&self, parent_id: &str) -> Vec<Job> {
        self.state
            .job_store
            .find_by_parent_id(parent_id)
            .await
            .expect("find children")
    }

    pub async fn cycle(&self) {
        self.poller.poll_once().await.expect("poll cycle");
    }
}
