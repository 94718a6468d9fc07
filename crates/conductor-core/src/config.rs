//! Engine configuration: polling cadence and remote service access.

use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.cursor.com";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Configuration shared by the scheduler and the HTTP agent client.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed interval between two poll cycles
    pub poll_interval: Duration,
    /// Base URL of the background-agent REST API
    pub api_base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, keeping defaults for anything unset.
    ///
    /// - `CONDUCTOR_POLL_INTERVAL_SECS`
    /// - `CONDUCTOR_API_BASE_URL`
    /// - `CONDUCTOR_API_KEY` (falls back to `CURSOR_API_KEY`)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = std::env::var("CONDUCTOR_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Ok(url) = std::env::var("CONDUCTOR_API_BASE_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().to_string();
            }
        }

        config.api_key = std::env::var("CONDUCTOR_API_KEY")
            .or_else(|_| std::env::var("CURSOR_API_KEY"))
            .unwrap_or_default();

        config
    }
}

/// Default database location: `~/.conductor/conductor.db`.
pub fn default_db_path() -> String {
    dirs::home_dir()
        .map(|home| home.join(".conductor").join("conductor.db"))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "conductor.db".to_string())
}
