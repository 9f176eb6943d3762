//! Process records and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::ProcessId;

/// Lifecycle state of a managed process.
///
/// `Starting → Running → {Completed, Failed, Killed, Error}`; the last
/// four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Killed,
    Error,
}

impl ProcessStatus {
    /// `true` for the terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed
                | ProcessStatus::Failed
                | ProcessStatus::Killed
                | ProcessStatus::Error
        )
    }
}

/// One foreground or background shell command and its accumulated state.
///
/// Invariant: `exit_code` and `end_time` are set iff `status` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ProcessRecord {
    pub id: ProcessId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub command: String,
    pub status: ProcessStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessRecord {
    /// A fresh record in `Starting`.
    #[must_use]
    pub fn new(id: ProcessId, command: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            id,
            pid: None,
            command: command.into(),
            status: ProcessStatus::Starting,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            session_id,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Moves the record into a terminal state, stamping exit code and end
    /// time together so the terminal invariant holds.
    pub fn finish(&mut self, status: ProcessStatus, exit_code: i32) {
        debug_assert!(status.is_terminal(), "finish takes a terminal status");
        self.status = status;
        self.exit_code = Some(exit_code);
        self.end_time = Some(Utc::now());
    }
}

/// One live log event dispatched to stream subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEvent {
    Stdout {
        data: String,
        timestamp: DateTime<Utc>,
    },
    Stderr {
        data: String,
        timestamp: DateTime<Utc>,
    },
    Exit {
        #[serde(rename = "exitCode")]
        exit_code: i32,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}
