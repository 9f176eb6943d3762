//! A live interpreter child and its protocol streams.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};

use warden_core::{Language, WorkerId};

use crate::protocol::{self, ExecutionRequest, ExecutionResult};
use crate::ExecutorError;

/// A warm interpreter subprocess speaking the line protocol.
///
/// The pool owns workers exclusively and addresses them by [`WorkerId`];
/// this type only carries the I/O state. Availability, affinity, and
/// idle bookkeeping live in the pool's slot table.
#[derive(Debug)]
pub struct InterpreterWorker {
    pub id: WorkerId,
    pub language: Language,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl InterpreterWorker {
    /// Wraps a freshly spawned child.
    ///
    /// Takes ownership of the piped streams and starts a drain task for
    /// the child's own stderr so diagnostics reach the logs instead of
    /// blocking the pipe.
    ///
    /// # Errors
    /// Returns [`ExecutorError::SpawnFailed`] if the child was spawned
    /// without piped stdio.
    pub fn from_child(
        id: WorkerId,
        language: Language,
        mut child: Child,
    ) -> Result<Self, ExecutorError> {
        let missing = |stream: &str| ExecutorError::SpawnFailed {
            language,
            reason: format!("child {stream} not piped"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(%language, worker = %id, "executor stderr: {line}");
                }
            });
        }
        Ok(Self { id, language, child, stdin, stdout: BufReader::new(stdout) })
    }

    /// Waits for the `{"status":"ready"}` handshake.
    ///
    /// Lines before the handshake that are not the ready object are
    /// skipped; runtimes occasionally print banners despite the
    /// no-warnings flags.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ReadyTimeout`] when the deadline passes and
    /// [`ExecutorError::WorkerExited`] if stdout reaches EOF first.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<(), ExecutorError> {
        let deadline = Instant::now() + timeout;
        let mut line = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ExecutorError::ReadyTimeout {
                    language: self.language,
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            line.clear();
            let read = tokio::time::timeout(remaining, self.stdout.read_line(&mut line)).await;
            match read {
                Err(_) => {
                    return Err(ExecutorError::ReadyTimeout {
                        language: self.language,
                        waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                Ok(Ok(0)) => return Err(ExecutorError::WorkerExited { language: self.language }),
                Ok(Ok(_)) => {
                    if protocol::is_ready_line(line.trim_end_matches('\n')) {
                        return Ok(());
                    }
                    tracing::debug!(worker = %self.id, "skipping pre-ready line");
                }
                Ok(Err(e)) => return Err(ExecutorError::Io(e)),
            }
        }
    }

    /// Runs one execution and returns the result plus a surplus flag.
    ///
    /// The surplus flag is `true` when the child wrote bytes beyond the
    /// first complete result line; such a worker must not be reused.
    ///
    /// # Errors
    /// - [`ExecutorError::ExecutionTimeout`] when `timeout` elapses; the
    ///   worker may still be writing and must be evicted.
    /// - [`ExecutorError::Protocol`] when the child emits a non-result line.
    /// - [`ExecutorError::WorkerExited`] on stdout EOF mid-execution.
    pub async fn execute(
        &mut self,
        code: &str,
        execution_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(ExecutionResult, bool), ExecutorError> {
        let request = ExecutionRequest {
            code: code.to_owned(),
            execution_id: execution_id.to_owned(),
        };
        let frame = protocol::encode_request(&request)
            .map_err(|e| ExecutorError::Protocol(e.to_string()))?;
        self.stdin.write_all(frame.as_bytes()).await?;
        self.stdin.flush().await?;

        let read = self.read_result(execution_id);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(inner) => inner?,
                Err(_) => {
                    return Err(ExecutorError::ExecutionTimeout {
                        execution_id: execution_id.to_owned(),
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => read.await?,
        };

        let surplus = !self.stdout.buffer().is_empty();
        if surplus {
            tracing::warn!(worker = %self.id, "surplus bytes after result line; worker is suspect");
        }
        Ok((result, surplus))
    }

    async fn read_result(&mut self, execution_id: &str) -> Result<ExecutionResult, ExecutorError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.stdout.read_line(&mut line).await?;
            if n == 0 {
                return Err(ExecutorError::WorkerExited { language: self.language });
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            let result = protocol::parse_result_line(trimmed)
                .map_err(|e| ExecutorError::Protocol(e.to_string()))?;
            if result.execution_id != execution_id {
                return Err(ExecutorError::Protocol(format!(
                    "result for {} while waiting for {execution_id}",
                    result.execution_id
                )));
            }
            return Ok(result);
        }
    }

    /// Returns `true` if the child has exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Delivers SIGKILL without waiting. The child was spawned with
    /// `kill_on_drop`, so this is safe to call from synchronous paths.
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(worker = %self.id, "kill delivery failed: {e}");
        }
    }

    /// Terminates the child and reaps it.
    pub async fn terminate(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(worker = %self.id, "terminate failed: {e}");
        }
    }
}
