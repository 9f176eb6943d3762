//! Port exposure and proxy routing for the Warden sandbox control plane.
//!
//! Registers internal ports with routing tokens, extracts routes from
//! `<port>-<sandboxId>-<token>` subdomains, and forwards requests to
//! services on loopback, protocol upgrades included.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod forward;
pub mod registry;
pub mod route;

pub use error::ProxyError;
pub use forward::{forward, forward_upgrade};
pub use registry::{ExposedPort, PortRegistry};
pub use route::{loopback_uri, parse_subdomain_host, preview_url, ProxyRoute};
