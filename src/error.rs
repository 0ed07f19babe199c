//! Error types for the banking agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Failures that cross a component boundary as Rust errors.
///
/// Backend failures are deliberately absent: the gateway folds them into
/// [`crate::models::OperationOutput::Failure`] so they reach the model as data.
#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Catalog / Routing
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Operation not exposed this turn: {0}")]
    OperationNotExposed(String),

    #[error("Invalid routing table: {0}")]
    InvalidRouting(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    // =============================
    // Orchestration
    // =============================

    #[error("Plan too long: model requested operations on {0} consecutive invocations without replying")]
    PlanTooLong(u32),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
