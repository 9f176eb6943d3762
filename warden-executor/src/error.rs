//! Error types for the executor crate.

use warden_core::{ApiError, ContextId, Domain, ErrorCode, Language};

/// Seconds a caller should wait before retrying a failed spawn.
const SPAWN_RETRY_AFTER_SECS: u64 = 2;

/// Errors raised by the interpreter pools and the interpreter service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// An interpreter child could not be started. Retryable by the caller.
    #[error("failed to start {language} executor: {reason}")]
    SpawnFailed { language: Language, reason: String },

    /// The child never produced its ready handshake within the deadline.
    #[error("{language} executor did not become ready within {waited_ms}ms")]
    ReadyTimeout { language: Language, waited_ms: u64 },

    /// The execution exceeded its deadline. The worker is not reused.
    #[error("execution {execution_id} timed out after {timeout_ms}ms")]
    ExecutionTimeout { execution_id: String, timeout_ms: u64 },

    /// The child violated the one-JSON-object-per-line protocol.
    #[error("executor protocol violation: {0}")]
    Protocol(String),

    /// The child exited while an execution was in flight.
    #[error("{language} executor exited unexpectedly")]
    WorkerExited { language: Language },

    /// The requested execution context does not exist.
    #[error("context not found: {0}")]
    ContextNotFound(ContextId),

    /// The requested language is not supported.
    #[error(transparent)]
    UnknownLanguage(#[from] warden_core::UnknownLanguage),

    /// The pool is shutting down.
    #[error("interpreter pool is shut down")]
    ShutDown,

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Renders the failure through the shared classifier.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        match self {
            ExecutorError::SpawnFailed { .. } | ExecutorError::ReadyTimeout { .. } => {
                ApiError::new(Domain::Interpreter, ErrorCode::InterpreterNotReady, self.to_string())
                    .with_retry_after(SPAWN_RETRY_AFTER_SECS)
            }
            ExecutorError::ExecutionTimeout { .. } => {
                ApiError::new(Domain::Interpreter, ErrorCode::ExecutionTimeout, self.to_string())
            }
            ExecutorError::ContextNotFound(_) => {
                ApiError::new(Domain::Interpreter, ErrorCode::ContextNotFound, self.to_string())
            }
            ExecutorError::UnknownLanguage(_) => {
                ApiError::new(Domain::Interpreter, ErrorCode::InvalidRequest, self.to_string())
            }
            ExecutorError::Protocol(_)
            | ExecutorError::WorkerExited { .. }
            | ExecutorError::ShutDown
            | ExecutorError::Io(_) => {
                ApiError::new(Domain::Interpreter, ErrorCode::Internal, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_maps_to_not_ready_with_retry_hint() {
        let err = ExecutorError::SpawnFailed {
            language: Language::Python,
            reason: "no such file".to_owned(),
        };
        let api = err.to_api_error();
        assert_eq!(api.http_status, 503);
        assert_eq!(api.code, "INTERPRETER_NOT_READY");
        assert_eq!(api.retry_after, Some(SPAWN_RETRY_AFTER_SECS));
    }

    #[test]
    fn context_not_found_maps_to_404() {
        let err = ExecutorError::ContextNotFound(ContextId::new("ctx-missing"));
        assert_eq!(err.to_api_error().http_status, 404);
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = ExecutorError::ExecutionTimeout {
            execution_id: "exec-1".to_owned(),
            timeout_ms: 30_000,
        };
        assert_eq!(err.to_api_error().http_status, 504);
    }

    #[test]
    fn protocol_violation_is_internal() {
        let api = ExecutorError::Protocol("surplus output".to_owned()).to_api_error();
        assert_eq!(api.http_status, 500);
        assert_eq!(api.code, "INTERPRETER_ERROR");
    }
}
