//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the engine driver and handle
///
/// Configuration and resource errors are detected early and returned
/// synchronously; per-request errors reject only the offending request.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Engine or device setup failure; fatal, aborts startup
    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    /// Malformed engine or generation configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Missing model artifacts
    #[error("Missing resource: {0}")]
    Resource(String),

    /// Duplicate or malformed request id/input; rejects that request only
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A background loop failed to terminate cleanly
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}
