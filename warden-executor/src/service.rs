//! The interpreter service: execution contexts and streamed results.
//!
//! Owns the context registry and drives the pools; results are fanned out
//! as an ordered event stream the gateway encodes as server-sent events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use warden_core::{ContextId, ExecutionContext, ExecutionId, Language};

use crate::backend::ExecutorBackend;
use crate::pool::PoolManager;
use crate::protocol::ExecutionResult;
use crate::ExecutorError;

/// Events emitted for one code execution, in order: stdout, stderr, rich
/// results, then exactly one terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterpreterEvent {
    Stdout {
        text: String,
    },
    Stderr {
        text: String,
    },
    Result {
        #[serde(rename = "outputType")]
        output_type: warden_core::OutputKind,
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    ExecutionComplete,
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Context registry plus pool orchestration.
pub struct InterpreterService<B: ExecutorBackend> {
    pools: Arc<PoolManager<B>>,
    contexts: std::sync::RwLock<HashMap<ContextId, ExecutionContext>>,
    workspace_dir: String,
}

impl<B: ExecutorBackend> InterpreterService<B> {
    /// Creates the service over existing pools.
    #[must_use]
    pub fn new(pools: Arc<PoolManager<B>>, workspace_dir: impl Into<String>) -> Self {
        Self {
            pools,
            contexts: std::sync::RwLock::new(HashMap::new()),
            workspace_dir: workspace_dir.into(),
        }
    }

    /// The pools this service drives.
    #[must_use]
    pub fn pools(&self) -> &Arc<PoolManager<B>> {
        &self.pools
    }

    /// Creates a context. Language defaults to python, the working
    /// directory to the sandbox workspace.
    pub fn create_context(
        &self,
        language: Option<Language>,
        cwd: Option<String>,
    ) -> ExecutionContext {
        let context = ExecutionContext::new(
            language.unwrap_or(Language::Python),
            cwd.unwrap_or_else(|| self.workspace_dir.clone()),
        );
        self.write_contexts().insert(context.id.clone(), context.clone());
        tracing::info!(context = %context.id, language = %context.language, "context created");
        context
    }

    /// All live contexts, oldest first.
    #[must_use]
    pub fn list_contexts(&self) -> Vec<ExecutionContext> {
        let mut contexts: Vec<_> = self.read_contexts().values().cloned().collect();
        contexts.sort_by_key(|c| c.created_at);
        contexts
    }

    /// Looks up one context.
    #[must_use]
    pub fn get_context(&self, id: &ContextId) -> Option<ExecutionContext> {
        self.read_contexts().get(id).cloned()
    }

    /// Deletes a context. Returns `true` if it existed.
    pub fn delete_context(&self, id: &ContextId) -> bool {
        let removed = self.write_contexts().remove(id).is_some();
        if removed {
            tracing::info!(context = %id, "context deleted");
        }
        removed
    }

    /// Runs `code` in the context and streams events.
    ///
    /// The context check happens before any streaming so an unknown
    /// context can surface as a plain 404. A `timeout` of `None` leaves
    /// the execution unlimited from the control plane's side.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ContextNotFound`] for unknown contexts.
    pub fn execute(
        self: &Arc<Self>,
        context_id: &ContextId,
        code: String,
        language_override: Option<Language>,
        timeout: Option<Duration>,
    ) -> Result<mpsc::Receiver<InterpreterEvent>, ExecutorError> {
        let language = {
            let mut contexts = self.write_contexts();
            let context = contexts
                .get_mut(context_id)
                .ok_or_else(|| ExecutorError::ContextNotFound(context_id.clone()))?;
            context.touch();
            language_override.unwrap_or(context.language)
        };

        let (tx, rx) = mpsc::channel(64);
        let service = Arc::clone(self);
        let session = context_id.as_str().to_owned();
        tokio::spawn(async move {
            let execution_id = ExecutionId::generate();
            let outcome = service
                .pools
                .execute_code(language, Some(&session), &code, execution_id.as_str(), timeout)
                .await;
            match outcome {
                Ok(result) => send_result_events(&tx, result).await,
                Err(e) => {
                    tracing::warn!(context = %session, "execution failed: {e}");
                    let (ename, evalue) = match &e {
                        ExecutorError::ExecutionTimeout { timeout_ms, .. } => (
                            "ExecutionTimeout".to_owned(),
                            format!("execution exceeded {timeout_ms}ms"),
                        ),
                        other => ("InterpreterError".to_owned(), other.to_string()),
                    };
                    let _ = tx
                        .send(InterpreterEvent::Error { ename, evalue, traceback: Vec::new() })
                        .await;
                }
            }
        });
        Ok(rx)
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn read_contexts(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ContextId, ExecutionContext>> {
        self.contexts.read().expect("context registry lock poisoned")
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn write_contexts(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<ContextId, ExecutionContext>> {
        self.contexts.write().expect("context registry lock poisoned")
    }
}

/// Fans one protocol result out into ordered events.
async fn send_result_events(tx: &mpsc::Sender<InterpreterEvent>, result: ExecutionResult) {
    if !result.stdout.is_empty() {
        let _ = tx.send(InterpreterEvent::Stdout { text: result.stdout.clone() }).await;
    }
    if !result.stderr.is_empty() {
        let _ = tx.send(InterpreterEvent::Stderr { text: result.stderr.clone() }).await;
    }
    for output in result.outputs.clone() {
        let _ = tx
            .send(InterpreterEvent::Result {
                output_type: output.kind,
                data: output.data,
                metadata: output.metadata,
            })
            .await;
    }
    if result.success {
        let _ = tx.send(InterpreterEvent::ExecutionComplete).await;
    } else {
        let event = match result.error {
            Some(info) => InterpreterEvent::Error {
                ename: info.ename,
                evalue: info.evalue,
                traceback: info.traceback,
            },
            None => InterpreterEvent::Error {
                ename: "ExecutionError".to_owned(),
                evalue: result.stderr.trim().to_owned(),
                traceback: Vec::new(),
            },
        };
        let _ = tx.send(event).await;
    }
}
