//! Command and process management for the Warden sandbox control plane.
//!
//! Foreground execution with cancellation, background processes with
//! status tracking and accumulated logs, and ordered log fan-out to
//! stream subscribers.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod manager;
pub mod record;

pub use error::ProcessError;
pub use manager::{CommandEvent, CommandOptions, ExecuteResult, ProcessManager, StreamKind};
pub use record::{LogEvent, ProcessRecord, ProcessStatus};
