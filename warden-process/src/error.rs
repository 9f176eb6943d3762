//! Error types for the process crate.

use warden_core::{classify_io, ApiError, Domain, ErrorCode, ProcessId};

/// Errors raised by command execution and the process registry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProcessError {
    /// The command matched the destructive-command deny list.
    #[error("Dangerous command not allowed")]
    DangerousCommand,

    /// A record with the caller-supplied identifier already exists.
    #[error("process already exists: {0}")]
    ProcessExists(ProcessId),

    /// No record with the given identifier.
    #[error("process not found: {0}")]
    ProcessNotFound(ProcessId),

    /// The caller cancelled the execution; the child was terminated.
    #[error("execution cancelled")]
    Cancelled,

    /// The named signal is not recognised.
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    /// The shell could not be spawned.
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Underlying I/O error while pumping child output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Renders the failure through the shared classifier.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        match self {
            ProcessError::DangerousCommand => {
                ApiError::new(Domain::Command, ErrorCode::DangerousCommand, self.to_string())
            }
            ProcessError::ProcessExists(_) => {
                ApiError::new(Domain::Process, ErrorCode::ProcessExists, self.to_string())
            }
            ProcessError::ProcessNotFound(_) => {
                ApiError::new(Domain::Process, ErrorCode::ProcessNotFound, self.to_string())
            }
            ProcessError::UnknownSignal(_) => {
                ApiError::new(Domain::Process, ErrorCode::InvalidRequest, self.to_string())
            }
            ProcessError::Cancelled => {
                ApiError::new(Domain::Command, ErrorCode::Internal, self.to_string())
            }
            ProcessError::Spawn(io) => ApiError::new(
                Domain::Command,
                classify_io(Domain::Command, io),
                self.to_string(),
            ),
            ProcessError::Io(io) => {
                ApiError::new(Domain::Process, classify_io(Domain::Process, io), self.to_string())
            }
        }
    }
}
