//! Shared application state.

use std::sync::Arc;

use warden_executor::{CommandBackend, InterpreterService, PoolManager};
use warden_process::ProcessManager;
use warden_proxy::PortRegistry;

use crate::config::GatewayConfig;

/// Process-wide state handed to every handler.
///
/// Everything here is initialized at startup and torn down at shutdown;
/// shutdown terminates every interpreter and background child.
#[derive(Clone)]
pub struct AppState {
    pub interpreter: Arc<InterpreterService<CommandBackend>>,
    pub processes: Arc<ProcessManager>,
    pub ports: Arc<PortRegistry>,
    pub config: GatewayConfig,
}

impl AppState {
    /// Wires the full state from configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let backend = CommandBackend::from_env();
        let pools = PoolManager::with_env_config(backend);
        let interpreter =
            Arc::new(InterpreterService::new(pools, config.workspace_dir.clone()));
        Self {
            interpreter,
            processes: ProcessManager::new(),
            ports: Arc::new(PortRegistry::new()),
            config,
        }
    }

    /// Terminates every child the control plane owns.
    pub async fn shutdown(&self) {
        let killed = self.processes.kill_all();
        if killed > 0 {
            tracing::info!(killed, "terminated background processes");
        }
        self.interpreter.pools().shutdown().await;
    }
}
