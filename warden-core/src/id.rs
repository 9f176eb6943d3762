use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a logical code-execution workspace.
///
/// Wire format: `ctx-<32 hex chars>` (a simple-formatted UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ContextId(pub String);

impl ContextId {
    /// Creates a new random `ContextId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ctx-{}", Uuid::new_v4().simple()))
    }

    /// Creates a `ContextId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies a foreground or background shell process record.
///
/// Wire format: `proc-<32 hex chars>` when generated; callers may supply
/// their own identifiers when starting background processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProcessId(pub String);

impl ProcessId {
    /// Creates a new random `ProcessId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("proc-{}", Uuid::new_v4().simple()))
    }

    /// Creates a `ProcessId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies a single code-execution request across the executor protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecutionId(pub String);

impl ExecutionId {
    /// Creates a new random `ExecutionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("exec-{}", Uuid::new_v4().simple()))
    }

    /// Creates an `ExecutionId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Index of an interpreter worker within its per-language pool.
///
/// Workers are owned exclusively by the pool and addressed by index;
/// worker handles never escape the pool as references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub struct WorkerId(pub u64);

impl WorkerId {
    /// Creates a `WorkerId` from a raw index.
    #[must_use]
    pub fn new(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

impl From<u64> for WorkerId {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_generate_uses_ctx_prefix() {
        let id = ContextId::generate();
        assert!(id.as_str().starts_with("ctx-"), "generated id must start with ctx-, got {id}");
        assert_eq!(id.as_str().len(), 4 + 32, "ctx- plus 32 hex chars");
    }

    #[test]
    fn process_id_generate_uses_proc_prefix() {
        let id = ProcessId::generate();
        assert!(id.as_str().starts_with("proc-"), "generated id must start with proc-, got {id}");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ExecutionId::generate();
        let b = ExecutionId::generate();
        assert_ne!(a, b, "two generated ExecutionIds must differ");
    }

    #[test]
    fn caller_supplied_process_id_round_trips() {
        let id = ProcessId::new("my-build");
        assert_eq!(id.as_str(), "my-build");
        assert_eq!(id.to_string(), "my-build");
    }

    #[test]
    fn worker_id_display_includes_index() {
        assert_eq!(WorkerId::new(7).to_string(), "worker-7");
    }
}
