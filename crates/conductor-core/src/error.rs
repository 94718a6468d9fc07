//! Core error type for the Conductor engine.
//!
//! `EngineError` is used throughout the core domain (stores, remote calls,
//! handlers). Parser and remote-client errors have their own enums and
//! convert into it.

use crate::agent::AgentServiceError;
use crate::workflow::schema::DefinitionError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Remote agent service error: {0}")]
    Remote(#[from] AgentServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported fan-out element type: {0}")]
    UnsupportedType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
