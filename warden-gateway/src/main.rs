//! Entry point for the `warden-gateway` control plane.

use std::sync::Arc;

use warden_gateway::{create_router, AppState, GatewayConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden_gateway=debug".into()),
        )
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let state = AppState::new(config.clone());

    // Pre-warming happens alongside serving; early requests that need a
    // worker spawn one on demand.
    let pools = Arc::clone(state.interpreter.pools());
    tokio::spawn(async move {
        pools.pre_warm().await;
    });

    let app = create_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        addr = %config.listen_addr,
        sandbox = %config.sandbox_id,
        "warden-gateway listening"
    );

    let shutdown_state = state.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("signal listener failed; running until killed");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    });

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "server error");
        state.shutdown().await;
        std::process::exit(1);
    }

    shutdown_state.shutdown().await;
}
