//! Conductor Core — job orchestration for remote coding agents.
//!
//! This crate holds everything the `conductor` binary needs to drive
//! long-running jobs against a remote background-agent service:
//!
//! - SQLite-backed job / prompt store
//! - The remote agent service trait and its HTTP client
//! - The workflow definition parser (sequence and parallel fan-out)
//! - The workflow execution engine: launcher, prompt sender, timeout
//!   tracking, fallbacks, result extraction and the three shape handlers
//! - The polling driver and its scheduler
//!
//! It has no CLI dependency and can be embedded in other front-ends.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::EngineError;
pub use state::{AppState, AppStateInner};
