//! Warm interpreter pools for the Warden sandbox control plane.
//!
//! Spawns language executor children, speaks the line-delimited JSON
//! protocol with them, pools them per language with session affinity, and
//! exposes the interpreter service the HTTP gateway streams from.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod service;
pub mod worker;

pub use backend::{CommandBackend, ExecutorBackend};
pub use error::ExecutorError;
pub use pool::{PoolConfig, PoolManager, PoolStats, WorkerLease};
pub use protocol::{ExecutionErrorInfo, ExecutionRequest, ExecutionResult, ProtocolError};
pub use service::{InterpreterEvent, InterpreterService};
pub use worker::InterpreterWorker;

/// Default per-execution timeout applied by callers that want a bound.
pub const DEFAULT_EXECUTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
