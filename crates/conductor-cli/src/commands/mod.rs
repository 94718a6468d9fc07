//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! conductor-core engine through `AppState`.

pub mod job;
pub mod run;
pub mod workflow;

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::agent::{AgentService, AgentServiceError, CloudAgentClient, Conversation, RemoteStatus};
use conductor_core::state::{AppState, AppStateInner};
use conductor_core::EngineConfig;

/// Stand-in used when no API key is configured. Local commands work; any
/// remote call fails with a configuration error.
pub struct UnconfiguredAgentService;

fn unconfigured() -> AgentServiceError {
    AgentServiceError::Config("no API key configured (set CONDUCTOR_API_KEY)".to_string())
}

#[async_trait]
impl AgentService for UnconfiguredAgentService {
    async fn launch(&self, _: &str, _: &str, _: &str, _: bool) -> Result<String, AgentServiceError> {
        Err(unconfigured())
    }

    async fn follow_up(&self, _: &str, _: &str) -> Result<String, AgentServiceError> {
        Err(unconfigured())
    }

    async fn status(&self, _: &str) -> Result<RemoteStatus, AgentServiceError> {
        Err(unconfigured())
    }

    async fn conversation(&self, _: &str) -> Result<Conversation, AgentServiceError> {
        Err(unconfigured())
    }

    async fn delete(&self, _: &str) -> Result<(), AgentServiceError> {
        Err(unconfigured())
    }
}

/// The HTTP client when an API key is configured, otherwise the stand-in.
pub fn agent_service(config: &EngineConfig) -> Arc<dyn AgentService> {
    match CloudAgentClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::debug!("[CLI] Remote agent service unavailable: {}", e);
            Arc::new(UnconfiguredAgentService)
        }
    }
}

/// Initialize a shared `AppState` from the given SQLite database path.
pub fn init_state(db_path: &str, config: &EngineConfig) -> Result<AppState, String> {
    let db = conductor_core::Database::open(db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    Ok(Arc::new(AppStateInner::new(db, agent_service(config))))
}

/// Load .env and .env.local files for environment variables.
pub fn load_dotenv() {
    // Try .env.local first (higher priority), then .env
    for filename in &[".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        if !path.exists() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = parse_env_line(line) {
                // Existing env vars take priority
                if std::env::var(&key).is_err() {
                    std::env::set_var(&key, &value);
                }
            }
        }
        tracing::info!("[CLI] Loaded environment from '{}'", filename);
    }
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim().trim_start_matches("export ").trim();
    if key.is_empty() {
        return None;
    }
    let mut value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = &value[1..value.len() - 1];
    }
    Some((key.to_string(), value.to_string()))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line() {
        assert_eq!(
            parse_env_line("CONDUCTOR_API_KEY=\"abc\""),
            Some(("CONDUCTOR_API_KEY".to_string(), "abc".to_string()))
        );
        assert_eq!(
            parse_env_line("export FOO = 'bar baz'"),
            Some(("FOO".to_string(), "bar baz".to_string()))
        );
        assert_eq!(parse_env_line("=value"), None);
        assert_eq!(parse_env_line("no equals sign"), None);
    }

    #[tokio::test]
    async fn test_unconfigured_service_refuses_remote_calls() {
        let service = agent_service(&EngineConfig::default());
        assert!(matches!(
            service.status("bc-1").await,
            Err(AgentServiceError::Config(_))
        ));
    }
}
