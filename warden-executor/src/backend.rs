//! Executor backend abstraction.
//!
//! Allows the pool to spawn real interpreter children in production and
//! scripted fakes in tests without changing the pooling logic.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use warden_core::Language;

use crate::ExecutorError;

/// Spawns interpreter children for a language.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait ExecutorBackend: Send + Sync + 'static {
    /// Spawn a child with piped stdin/stdout/stderr.
    ///
    /// The child is expected to speak the line protocol of
    /// [`crate::protocol`] and emit the ready handshake on startup.
    ///
    /// # Errors
    /// Returns [`ExecutorError::SpawnFailed`] if the process cannot start.
    async fn spawn(&self, language: Language) -> Result<Child, ExecutorError>;
}

/// Production backend: spawns the standalone executor programs.
///
/// Python children run with `PYTHONUNBUFFERED=1`; node children run with
/// `--no-warnings` so diagnostics never pollute the protocol stream.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    /// Directory holding the executor programs.
    executor_dir: PathBuf,
    /// Working directory the children start in.
    working_dir: PathBuf,
}

impl CommandBackend {
    /// Creates a backend with explicit paths.
    #[must_use]
    pub fn new(executor_dir: PathBuf, working_dir: PathBuf) -> Self {
        Self { executor_dir, working_dir }
    }

    /// Creates a backend from the environment.
    ///
    /// `WARDEN_EXECUTOR_DIR` (default `/opt/warden/executors`) locates the
    /// executor programs; `WARDEN_WORKSPACE_DIR` (default `/workspace`) is
    /// the children's working directory.
    #[must_use]
    pub fn from_env() -> Self {
        let executor_dir = std::env::var("WARDEN_EXECUTOR_DIR")
            .unwrap_or_else(|_| "/opt/warden/executors".to_owned());
        let working_dir =
            std::env::var("WARDEN_WORKSPACE_DIR").unwrap_or_else(|_| "/workspace".to_owned());
        Self::new(PathBuf::from(executor_dir), PathBuf::from(working_dir))
    }

    fn command_for(&self, language: Language) -> Command {
        let mut cmd = match language {
            Language::Python => {
                let mut c = Command::new("python3");
                c.arg(self.executor_dir.join("python_executor.py"));
                c.env("PYTHONUNBUFFERED", "1");
                c
            }
            Language::JavaScript => {
                let mut c = Command::new("node");
                c.arg("--no-warnings");
                c.arg(self.executor_dir.join("javascript_executor.js"));
                c
            }
            Language::TypeScript => {
                let mut c = Command::new("node");
                c.arg("--no-warnings");
                c.arg(self.executor_dir.join("typescript_executor.js"));
                c
            }
        };
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ExecutorBackend for CommandBackend {
    async fn spawn(&self, language: Language) -> Result<Child, ExecutorError> {
        tracing::debug!(%language, dir = %self.executor_dir.display(), "spawning executor child");
        self.command_for(language).spawn().map_err(|e| ExecutorError::SpawnFailed {
            language,
            reason: e.to_string(),
        })
    }
}
