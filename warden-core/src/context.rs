//! Execution contexts: logical, language-bound workspaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ContextId;
use crate::language::Language;

/// A logical workspace for code execution.
///
/// Contexts map an opaque identifier to a language and working directory.
/// The language is immutable after creation; `last_used_at` is the only
/// field that mutates, on each execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecutionContext {
    pub id: ContextId,
    pub language: Language,
    /// Absolute path under the sandbox root.
    pub cwd: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Creates a fresh context with a generated identifier.
    #[must_use]
    pub fn new(language: Language, cwd: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ContextId::generate(),
            language,
            cwd: cwd.into(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Marks the context as used now.
    pub fn touch(&mut self) {
        self.last_used_at = Utc::now();
    }
}
