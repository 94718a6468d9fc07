//! Shared engine state handed to every handler.

use std::sync::Arc;

use crate::agent::AgentService;
use crate::db::Database;
use crate::store::{JobStore, PromptStore};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub job_store: JobStore,
    pub prompt_store: PromptStore,
    pub agents: Arc<dyn AgentService>,
}

impl AppStateInner {
    pub fn new(db: Database, agents: Arc<dyn AgentService>) -> Self {
        Self {
            job_store: JobStore::new(db.clone()),
            prompt_store: PromptStore::new(db.clone()),
            db,
            agents,
        }
    }
}
