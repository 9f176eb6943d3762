//! Foreground and background shell command execution.
//!
//! Foreground commands are awaited and return an accumulated result;
//! background commands are registered in the process registry and
//! observed through the status, log, and stream endpoints. Every byte a
//! child emits is appended to its record and fanned out to subscribers in
//! emission order.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_core::ProcessId;

use crate::record::{LogEvent, ProcessRecord, ProcessStatus};
use crate::ProcessError;

/// A record in `Starting` moves to `Running` after this long even if the
/// child has produced no output yet.
const RUNNING_GRACE: std::time::Duration = std::time::Duration::from_millis(500);

/// Tokens that reject a command outright. A coarse filter, not a shell
/// parser and not a security boundary; the sandbox is the boundary.
const DENY_LIST: [&str; 8] =
    ["rm", "rmdir", "mkfs", "dd", "shutdown", "reboot", "halt", "poweroff"];

/// Options shared by foreground and background execution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CommandOptions {
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub session_id: Option<String>,
    /// Caller-supplied identifier for background processes.
    pub process_id: Option<String>,
}

/// Result of an awaited foreground command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ExecuteResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    pub timestamp: DateTime<Utc>,
    pub command: String,
}

/// Which child stream a streamed output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Events on the streaming command endpoint. `CommandComplete` and
/// `Error` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandEvent {
    CommandStart {
        command: String,
        timestamp: DateTime<Utc>,
    },
    Output {
        stream: StreamKind,
        data: String,
        timestamp: DateTime<Utc>,
    },
    CommandComplete {
        #[serde(rename = "exitCode")]
        exit_code: i32,
        success: bool,
        stdout: String,
        stderr: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

struct ProcessEntry {
    record: Mutex<ProcessRecord>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<LogEvent>>>,
    kill_requested: AtomicBool,
}

impl ProcessEntry {
    fn new(record: ProcessRecord) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(record),
            subscribers: Mutex::new(Vec::new()),
            kill_requested: AtomicBool::new(false),
        })
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn record(&self) -> MutexGuard<'_, ProcessRecord> {
        self.record.lock().expect("process record lock poisoned")
    }

    fn snapshot(&self) -> ProcessRecord {
        self.record().clone()
    }

    fn mark_running(&self) {
        let mut record = self.record();
        if record.status == ProcessStatus::Starting {
            record.status = ProcessStatus::Running;
        }
    }

    /// Delivers an event to every live subscriber, pruning closed ones.
    fn dispatch(&self, event: &LogEvent) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn close_subscribers(&self) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.subscribers.lock().expect("subscriber lock poisoned").clear();
    }
}

/// Registry and executor for shell commands.
#[derive(Default)]
pub struct ProcessManager {
    registry: Mutex<IndexMap<ProcessId, Arc<ProcessEntry>>>,
}

impl ProcessManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects commands containing a deny-listed token.
    ///
    /// Tokens are split on whitespace and shell separators, so
    /// `echo "alarm"` passes while `rm -rf /` and `true; rm x` do not.
    /// `/bin/rm` still slips through; this is not a security boundary.
    ///
    /// # Errors
    /// Returns [`ProcessError::DangerousCommand`] on a match.
    pub fn check_command(command: &str) -> Result<(), ProcessError> {
        let tokens = command
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '|' | '&' | '(' | ')'))
            .filter(|t| !t.is_empty());
        for token in tokens {
            if DENY_LIST.contains(&token) {
                return Err(ProcessError::DangerousCommand);
            }
        }
        Ok(())
    }

    /// Runs a command in the foreground and waits for it.
    ///
    /// Firing `cancel` terminates the child and resolves the call with
    /// [`ProcessError::Cancelled`].
    ///
    /// # Errors
    /// [`ProcessError::DangerousCommand`] before spawning,
    /// [`ProcessError::Spawn`] if the shell cannot start, and
    /// [`ProcessError::Cancelled`] on cancellation.
    pub async fn execute(
        &self,
        command: &str,
        options: &CommandOptions,
        cancel: CancellationToken,
    ) -> Result<ExecuteResult, ProcessError> {
        Self::check_command(command)?;
        let started = Instant::now();
        let timestamp = Utc::now();
        let mut child = build_shell_command(command, options).spawn().map_err(ProcessError::Spawn)?;
        let pid = child.id();

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let work = async move {
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            let (out_read, err_read) = tokio::join!(
                async {
                    match &mut stdout {
                        Some(s) => s.read_to_end(&mut out_buf).await.map(|_| ()),
                        None => Ok(()),
                    }
                },
                async {
                    match &mut stderr {
                        Some(s) => s.read_to_end(&mut err_buf).await.map(|_| ()),
                        None => Ok(()),
                    }
                }
            );
            out_read?;
            err_read?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out_buf, err_buf, status))
        };
        tokio::pin!(work);

        let (out_buf, err_buf, status) = tokio::select! {
            () = cancel.cancelled() => {
                // Dropping `work` drops the child, whose kill_on_drop
                // delivers SIGKILL; the explicit signal is for promptness.
                if let Some(pid) = pid {
                    deliver_signal(pid, libc::SIGKILL);
                }
                return Err(ProcessError::Cancelled);
            }
            result = &mut work => result?,
        };

        let exit_code = status.code().unwrap_or(-1);
        Ok(ExecuteResult {
            success: status.success(),
            exit_code,
            stdout: String::from_utf8_lossy(&out_buf).into_owned(),
            stderr: String::from_utf8_lossy(&err_buf).into_owned(),
            duration: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timestamp,
            command: command.to_owned(),
        })
    }

    /// Runs a command in the foreground, streaming events as they happen.
    ///
    /// Event order: `command_start`, interleaved `output` chunks in
    /// emission order, then a single terminal `command_complete` (or
    /// `error`). No event follows the terminal one.
    ///
    /// # Errors
    /// Returns [`ProcessError::DangerousCommand`] before any event is
    /// produced; later failures surface as `error` events on the stream.
    pub fn execute_stream(
        &self,
        command: String,
        options: CommandOptions,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<CommandEvent>, ProcessError> {
        Self::check_command(&command)?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let _ = tx
                .send(CommandEvent::CommandStart {
                    command: command.clone(),
                    timestamp: Utc::now(),
                })
                .await;
            let mut child = match build_shell_command(&command, &options).spawn() {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx
                        .send(CommandEvent::Error {
                            message: format!("failed to spawn command: {e}"),
                            timestamp: Utc::now(),
                        })
                        .await;
                    return;
                }
            };
            let pid = child.id();
            let out_task = child.stdout.take().map(|s| {
                tokio::spawn(pump_stream(s, tx.clone(), StreamKind::Stdout))
            });
            let err_task = child.stderr.take().map(|s| {
                tokio::spawn(pump_stream(s, tx.clone(), StreamKind::Stderr))
            });

            let waited = tokio::select! {
                () = cancel.cancelled() => None,
                status = child.wait() => Some(status),
            };

            if waited.is_none() {
                if let Some(pid) = pid {
                    deliver_signal(pid, libc::SIGKILL);
                }
                let _ = child.wait().await;
            }
            // Drain the pumps before any terminal event so output never
            // trails command_complete.
            let stdout = match out_task {
                Some(t) => t.await.unwrap_or_default(),
                None => String::new(),
            };
            let stderr = match err_task {
                Some(t) => t.await.unwrap_or_default(),
                None => String::new(),
            };

            let event = match waited {
                None => CommandEvent::Error {
                    message: "execution cancelled".to_owned(),
                    timestamp: Utc::now(),
                },
                Some(Err(e)) => CommandEvent::Error {
                    message: format!("failed to reap command: {e}"),
                    timestamp: Utc::now(),
                },
                Some(Ok(status)) => {
                    let exit_code = status.code().unwrap_or(-1);
                    CommandEvent::CommandComplete {
                        exit_code,
                        success: status.success(),
                        stdout,
                        stderr,
                        timestamp: Utc::now(),
                    }
                }
            };
            let _ = tx.send(event).await;
        });
        Ok(rx)
    }

    /// Starts a background process and registers its record.
    ///
    /// Returns as soon as the child is launched; spawn failures after
    /// registration surface through the record's `error` status, never
    /// through this call.
    ///
    /// # Errors
    /// [`ProcessError::DangerousCommand`] and
    /// [`ProcessError::ProcessExists`] for a duplicate caller-supplied id.
    pub fn start(
        self: &Arc<Self>,
        command: &str,
        options: &CommandOptions,
    ) -> Result<ProcessRecord, ProcessError> {
        Self::check_command(command)?;
        let id = options
            .process_id
            .as_ref()
            .map_or_else(ProcessId::generate, |s| ProcessId::new(s.clone()));

        let entry = {
            let mut registry = self.lock_registry();
            if registry.contains_key(&id) {
                return Err(ProcessError::ProcessExists(id));
            }
            let record = ProcessRecord::new(id.clone(), command, options.session_id.clone());
            let entry = ProcessEntry::new(record);
            registry.insert(id.clone(), Arc::clone(&entry));
            entry
        };

        match build_shell_command(command, options).spawn() {
            Ok(child) => {
                entry.record().pid = child.id();
                tracing::info!(process = %id, pid = ?child.id(), "background process started");
                let monitor_entry = Arc::clone(&entry);
                tokio::spawn(monitor_background(monitor_entry, child));
            }
            Err(e) => {
                tracing::warn!(process = %id, "background spawn failed: {e}");
                entry.record().finish(ProcessStatus::Error, -1);
                entry.dispatch(&LogEvent::Error {
                    message: format!("failed to spawn command: {e}"),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(entry.snapshot())
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn get(&self, id: &ProcessId) -> Option<ProcessRecord> {
        self.lock_registry().get(id).map(|e| e.snapshot())
    }

    /// Snapshots of all records, in start order.
    #[must_use]
    pub fn list(&self) -> Vec<ProcessRecord> {
        self.lock_registry().values().map(|e| e.snapshot()).collect()
    }

    /// Accumulated stdout and stderr of one record.
    ///
    /// # Errors
    /// [`ProcessError::ProcessNotFound`] for unknown ids.
    pub fn logs(&self, id: &ProcessId) -> Result<(String, String), ProcessError> {
        let snapshot = self.get(id).ok_or_else(|| ProcessError::ProcessNotFound(id.clone()))?;
        Ok((snapshot.stdout, snapshot.stderr))
    }

    /// Attaches a live log subscriber to a record.
    ///
    /// For a record that is already terminal the subscriber receives a
    /// single `exit` event and the stream ends.
    ///
    /// # Errors
    /// [`ProcessError::ProcessNotFound`] for unknown ids.
    pub fn subscribe(
        &self,
        id: &ProcessId,
    ) -> Result<mpsc::UnboundedReceiver<LogEvent>, ProcessError> {
        let entry = self
            .lock_registry()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessError::ProcessNotFound(id.clone()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = entry.snapshot();
        if snapshot.status.is_terminal() {
            let _ = tx.send(LogEvent::Exit {
                exit_code: snapshot.exit_code.unwrap_or(-1),
                timestamp: Utc::now(),
            });
        } else {
            #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
            entry.subscribers.lock().expect("subscriber lock poisoned").push(tx);
        }
        Ok(rx)
    }

    /// Delivers a signal (default SIGTERM) to a live process.
    ///
    /// The record moves to `killed` when the child actually exits, so the
    /// terminal invariant (exit code with end time) always holds.
    ///
    /// # Errors
    /// [`ProcessError::ProcessNotFound`] and
    /// [`ProcessError::UnknownSignal`].
    pub fn kill(&self, id: &ProcessId, signal: Option<&str>) -> Result<(), ProcessError> {
        let signum = parse_signal(signal.unwrap_or("SIGTERM"))?;
        let entry = self
            .lock_registry()
            .get(id)
            .cloned()
            .ok_or_else(|| ProcessError::ProcessNotFound(id.clone()))?;
        let snapshot = entry.snapshot();
        if snapshot.status.is_terminal() {
            return Ok(());
        }
        entry.kill_requested.store(true, Ordering::SeqCst);
        if let Some(pid) = snapshot.pid {
            tracing::info!(process = %id, pid, signal = signum, "delivering signal");
            deliver_signal(pid, signum);
        }
        Ok(())
    }

    /// SIGTERMs every non-terminal process. Returns the count signalled.
    pub fn kill_all(&self) -> usize {
        let entries: Vec<_> = self.lock_registry().values().cloned().collect();
        let mut killed = 0;
        for entry in entries {
            let snapshot = entry.snapshot();
            if snapshot.status.is_terminal() {
                continue;
            }
            entry.kill_requested.store(true, Ordering::SeqCst);
            if let Some(pid) = snapshot.pid {
                deliver_signal(pid, libc::SIGTERM);
            }
            killed += 1;
        }
        killed
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn lock_registry(&self) -> MutexGuard<'_, IndexMap<ProcessId, Arc<ProcessEntry>>> {
        self.registry.lock().expect("process registry lock poisoned")
    }
}

fn build_shell_command(command: &str, options: &CommandOptions) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = &options.env {
        cmd.envs(env);
    }
    cmd
}

/// Reads a child stream to EOF, forwarding chunks as events and
/// returning the accumulated text.
async fn pump_stream(
    mut stream: impl AsyncRead + Unpin,
    tx: mpsc::Sender<CommandEvent>,
    kind: StreamKind,
) -> String {
    let mut acc = String::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                acc.push_str(&text);
                let _ = tx
                    .send(CommandEvent::Output { stream: kind, data: text, timestamp: Utc::now() })
                    .await;
            }
        }
    }
    acc
}

/// Observes one background child: pumps its output into the record and
/// subscribers, applies the running-grace transition, and stamps the
/// terminal state when the child exits.
async fn monitor_background(entry: Arc<ProcessEntry>, mut child: Child) {
    let out_task = child
        .stdout
        .take()
        .map(|s| tokio::spawn(pump_background(s, Arc::clone(&entry), StreamKind::Stdout)));
    let err_task = child
        .stderr
        .take()
        .map(|s| tokio::spawn(pump_background(s, Arc::clone(&entry), StreamKind::Stderr)));

    let grace_entry = Arc::clone(&entry);
    tokio::spawn(async move {
        tokio::time::sleep(RUNNING_GRACE).await;
        grace_entry.mark_running();
    });

    let status = child.wait().await;
    if let Some(t) = out_task {
        let _ = t.await;
    }
    if let Some(t) = err_task {
        let _ = t.await;
    }

    let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
    {
        let mut record = entry.record();
        if !record.status.is_terminal() {
            let status = if entry.kill_requested.load(Ordering::SeqCst) {
                ProcessStatus::Killed
            } else if exit_code == 0 {
                ProcessStatus::Completed
            } else {
                ProcessStatus::Failed
            };
            record.finish(status, exit_code);
            tracing::info!(process = %record.id, exit_code, status = ?record.status, "background process exited");
        }
    }
    entry.dispatch(&LogEvent::Exit { exit_code, timestamp: Utc::now() });
    entry.close_subscribers();
}

/// Appends chunks to the record buffer and fans them out, in the order
/// the child emitted them. The first byte flips `starting` to `running`.
async fn pump_background(
    mut stream: impl AsyncRead + Unpin,
    entry: Arc<ProcessEntry>,
    kind: StreamKind,
) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                entry.mark_running();
                {
                    let mut record = entry.record();
                    match kind {
                        StreamKind::Stdout => record.stdout.push_str(&text),
                        StreamKind::Stderr => record.stderr.push_str(&text),
                    }
                }
                let timestamp = Utc::now();
                let event = match kind {
                    StreamKind::Stdout => LogEvent::Stdout { data: text, timestamp },
                    StreamKind::Stderr => LogEvent::Stderr { data: text, timestamp },
                };
                entry.dispatch(&event);
            }
        }
    }
}

fn parse_signal(name: &str) -> Result<i32, ProcessError> {
    match name.trim_start_matches("SIG") {
        "TERM" => Ok(libc::SIGTERM),
        "KILL" => Ok(libc::SIGKILL),
        "INT" => Ok(libc::SIGINT),
        "HUP" => Ok(libc::SIGHUP),
        "QUIT" => Ok(libc::SIGQUIT),
        "USR1" => Ok(libc::SIGUSR1),
        "USR2" => Ok(libc::SIGUSR2),
        _ => Err(ProcessError::UnknownSignal(name.to_owned())),
    }
}

fn deliver_signal(pid: u32, signum: i32) {
    // SAFETY: kill(2) with a valid pid and signal number has no memory
    // safety concerns; a stale pid at worst returns ESRCH.
    let rc = unsafe { libc::kill(i32::try_from(pid).unwrap_or(-1), signum) };
    if rc != 0 {
        tracing::debug!(pid, signum, "signal delivery failed: {}", std::io::Error::last_os_error());
    }
}
