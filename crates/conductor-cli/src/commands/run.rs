//! `conductor run` — Drive unfinished jobs with the polling scheduler.

use conductor_core::state::AppState;
use conductor_core::workflow::{Poller, Scheduler};
use conductor_core::EngineConfig;

/// Refuse to poll without credentials: every launch would fail, and a failed
/// launch is terminal for the job.
pub fn require_api_key(config: &EngineConfig) -> Result<(), String> {
    if config.api_key.trim().is_empty() {
        return Err("No API key configured. Set CONDUCTOR_API_KEY or pass --api-key.".to_string());
    }
    Ok(())
}

/// Run a single poll cycle (`once`) or poll every `config.poll_interval`
/// until Ctrl-C.
pub async fn run(state: &AppState, config: &EngineConfig, once: bool) -> Result<(), String> {
    require_api_key(config)?;
    let poller = Poller::new(state.clone());

    if once {
        let summary = poller.poll_once().await.map_err(|e| e.to_string())?;
        println!(
            "Processed {} job(s), {} failed.",
            summary.processed, summary.failed
        );
        return Ok(());
    }

    let interval = config.poll_interval;
    let handle = Scheduler::new(poller).start(interval);
    println!("Polling every {}s. Press Ctrl-C to stop.", interval.as_secs_f64());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;

    println!("Stopping...");
    handle.stop().await;
    Ok(())
}
