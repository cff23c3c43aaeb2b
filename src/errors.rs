//! # Execution Errors
//!
//! The classified error taxonomy returned by query executions.

use std::time::Duration;

use thiserror::Error;

/// Result type for query execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Classified query execution errors
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    // ==================
    // Input Errors
    // ==================
    /// Query definition rejected before any network call
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // ==================
    // Expected Outcomes
    // ==================
    /// Request/reply received zero replies within the timeout.
    /// This is a normal, reportable outcome, not an engine failure.
    #[error("no reply on subject '{subject}' within {timeout:?}")]
    NoResponse { subject: String, timeout: Duration },

    // ==================
    // Mapping Errors
    // ==================
    /// Payload is not valid JSON under the default mapping.
    /// Carries the raw payload size and a bounded preview, never the
    /// full payload.
    #[error("payload is not valid JSON ({size} bytes): {preview}")]
    MalformedPayload { size: usize, preview: String },

    /// Script returned something other than a row map, a sequence of
    /// row maps, or a built frame
    #[error("unsupported script result shape: {0}")]
    InvalidScriptResult(String),

    // ==================
    // Script Errors
    // ==================
    /// Script failed to compile or raised an uncaught error
    #[error("script error: {0}")]
    ScriptError(String),

    // ==================
    // Transport Errors
    // ==================
    /// NATS connection-level failure (disconnect, auth rejection)
    #[error("transport error: {0}")]
    TransportError(String),

    // ==================
    // Lifecycle Errors
    // ==================
    /// Dispatcher-level deadline exceeded
    #[error("execution exceeded {0:?}")]
    Timeout(Duration),

    /// Caller-initiated abort of a streaming execution
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Whether this error ends a Subscribe-mode execution.
    ///
    /// Per-message mapping failures are reported and the subscription
    /// continues; structural and connection-level failures terminate it.
    pub fn is_fatal_for_subscription(&self) -> bool {
        match self {
            ExecutionError::MalformedPayload { .. }
            | ExecutionError::ScriptError(_)
            | ExecutionError::InvalidScriptResult(_)
            | ExecutionError::NoResponse { .. } => false,
            ExecutionError::InvalidQuery(_)
            | ExecutionError::TransportError(_)
            | ExecutionError::Timeout(_)
            | ExecutionError::Cancelled => true,
        }
    }
}
