//! Core types for the Warden sandbox control plane.
//!
//! Defines the fundamental domain types: identifiers, languages, execution
//! contexts, rich outputs, the input guard, and the error classifier shared
//! by every other crate in the workspace.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod classify;
pub mod context;
pub mod guard;
pub mod id;
pub mod language;
pub mod output;

pub use classify::{classify_git, classify_io, ApiError, Domain, ErrorCode, GitPhase};
pub use context::ExecutionContext;
pub use guard::{validate_path, validate_port, validate_sandbox_id, GuardError, RESERVED_PORTS};
pub use id::{ContextId, ExecutionId, ProcessId, WorkerId};
pub use language::{Language, UnknownLanguage};
pub use output::{OutputKind, RichOutput};
