//! HTTP gateway for the Warden sandbox control plane.
//!
//! One axum surface over the interpreter service, the process manager,
//! and the port registry, plus filesystem and git collaborator
//! endpoints and the loopback proxy.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod files;
pub mod git;
pub mod routes;
pub mod sse;
pub mod state;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use routes::create_router;
pub use state::AppState;
