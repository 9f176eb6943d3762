//! Integration tests: the interpreter service event stream.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use warden_core::{ContextId, Language};
use warden_executor::{
    ExecutorBackend, ExecutorError, InterpreterEvent, InterpreterService, PoolConfig, PoolManager,
};

/// Speaks the line protocol and answers every request with stdout plus a
/// rich html output, echoing the executionId back.
const RICH_CHILD: &str = r#"
echo '{"status":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"executionId":"\([^"]*\)".*/\1/p')
  printf '{"stdout":"out","stderr":"warn","success":true,"executionId":"%s","outputs":[{"type":"html","data":"<b>hi</b>"}]}\n' "$id"
done
"#;

/// Fails every request with a structured python-style error.
const FAILING_CHILD: &str = r#"
echo '{"status":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"executionId":"\([^"]*\)".*/\1/p')
  printf '{"stdout":"","stderr":"ZeroDivisionError: division by zero","success":false,"executionId":"%s","outputs":[],"error":{"ename":"ZeroDivisionError","evalue":"division by zero","traceback":["Traceback (most recent call last):","ZeroDivisionError: division by zero"]}}\n' "$id"
done
"#;

#[derive(Debug, Clone)]
struct ShellBackend {
    script: &'static str,
}

#[async_trait]
impl ExecutorBackend for ShellBackend {
    async fn spawn(&self, language: Language) -> Result<Child, ExecutorError> {
        Command::new("sh")
            .arg("-c")
            .arg(self.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::SpawnFailed { language, reason: e.to_string() })
    }
}

fn service(script: &'static str) -> Arc<InterpreterService<ShellBackend>> {
    let configs: HashMap<_, _> = Language::ALL
        .iter()
        .map(|&language| {
            let mut config = PoolConfig::defaults_for(language);
            config.min_size = 0;
            config.max_processes = 2;
            (language, config)
        })
        .collect();
    let pools = PoolManager::new(ShellBackend { script }, configs);
    Arc::new(InterpreterService::new(pools, "/workspace"))
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<InterpreterEvent>) -> Vec<InterpreterEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn successful_execution_streams_in_spec_order() {
    let service = service(RICH_CHILD);
    let context = service.create_context(Some(Language::Python), None);

    let rx = service
        .execute(&context.id, "whatever".to_owned(), None, None)
        .unwrap_or_else(|e| panic!("execute failed: {e}"));
    let events = drain(rx).await;

    assert_eq!(events.len(), 4, "stdout, stderr, result, terminal: {events:?}");
    assert!(matches!(&events[0], InterpreterEvent::Stdout { text } if text == "out"));
    assert!(matches!(&events[1], InterpreterEvent::Stderr { text } if text == "warn"));
    match &events[2] {
        InterpreterEvent::Result { output_type, data, .. } => {
            assert_eq!(*output_type, warden_core::OutputKind::Html);
            assert_eq!(data, "<b>hi</b>");
        }
        other => panic!("expected result event, got {other:?}"),
    }
    assert!(matches!(events[3], InterpreterEvent::ExecutionComplete));
    service.pools().shutdown().await;
}

#[tokio::test]
async fn failed_execution_ends_with_structured_error() {
    let service = service(FAILING_CHILD);
    let context = service.create_context(Some(Language::Python), None);

    let rx = service
        .execute(&context.id, "1/0".to_owned(), None, None)
        .unwrap_or_else(|e| panic!("execute failed: {e}"));
    let events = drain(rx).await;

    let last = events.last().unwrap_or_else(|| panic!("stream must not be empty"));
    match last {
        InterpreterEvent::Error { ename, evalue, traceback } => {
            assert_eq!(ename, "ZeroDivisionError");
            assert_eq!(evalue, "division by zero");
            assert_eq!(traceback.len(), 2);
        }
        other => panic!("terminal event must be an error, got {other:?}"),
    }
    service.pools().shutdown().await;
}

#[tokio::test]
async fn unknown_context_fails_before_any_streaming() {
    let service = service(RICH_CHILD);
    let result = service.execute(&ContextId::new("ctx-missing"), "x".to_owned(), None, None);
    assert!(
        matches!(result, Err(ExecutorError::ContextNotFound(_))),
        "unknown context must fail eagerly: {result:?}"
    );
    service.pools().shutdown().await;
}

#[tokio::test]
async fn consecutive_executions_reuse_the_context_worker() {
    let service = service(RICH_CHILD);
    let context = service.create_context(Some(Language::JavaScript), None);

    for _ in 0..3 {
        let rx = service
            .execute(&context.id, "code".to_owned(), None, None)
            .unwrap_or_else(|e| panic!("execute failed: {e}"));
        let events = drain(rx).await;
        assert!(matches!(events.last(), Some(InterpreterEvent::ExecutionComplete)));
    }
    // Affinity keeps the context on one warm worker.
    let stats = service.pools().stats(Language::JavaScript);
    assert_eq!(stats.total, 1, "three serial executions must not grow the pool");
    service.pools().shutdown().await;
}

#[tokio::test]
async fn context_listing_tracks_creation_and_deletion() {
    let service = service(RICH_CHILD);
    let a = service.create_context(Some(Language::Python), Some("/workspace/a".to_owned()));
    let b = service.create_context(Some(Language::TypeScript), None);
    assert_eq!(service.list_contexts().len(), 2);
    assert_eq!(
        service.get_context(&a.id).map(|c| c.cwd),
        Some("/workspace/a".to_owned())
    );

    assert!(service.delete_context(&a.id));
    assert!(!service.delete_context(&a.id), "double delete must report absence");
    let remaining = service.list_contexts();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, b.id);
    service.pools().shutdown().await;
}
