//! In-memory registry of exposed ports.
//!
//! Each registration carries an opaque high-entropy token; subdomain
//! requests must present the token to reach the port.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use warden_core::validate_port;

use crate::ProxyError;

/// Hex characters of a routing token. Tokens travel inside DNS labels,
/// so the alphabet stays lowercase hexadecimal.
const TOKEN_LEN: usize = 32;

/// One exposed port registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ExposedPort {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub token: String,
    pub exposed_at: DateTime<Utc>,
}

/// Thread-safe registry of exposed ports.
#[derive(Debug, Default)]
pub struct PortRegistry {
    entries: RwLock<HashMap<u16, ExposedPort>>,
}

impl PortRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a port and mints its token.
    ///
    /// # Errors
    /// [`ProxyError::InvalidPort`] / [`ProxyError::ReservedPort`] for
    /// ports the guard refuses, [`ProxyError::AlreadyExposed`] for
    /// duplicates.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    pub fn expose(&self, port: u16, name: Option<String>) -> Result<ExposedPort, ProxyError> {
        validate_port(port)?;
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut entries = self.entries.write().expect("port registry lock poisoned");
        if entries.contains_key(&port) {
            return Err(ProxyError::AlreadyExposed(port));
        }
        let entry =
            ExposedPort { port, name, token: mint_token(port), exposed_at: Utc::now() };
        entries.insert(port, entry.clone());
        tracing::info!(port, "port exposed");
        Ok(entry)
    }

    /// Removes a registration.
    ///
    /// # Errors
    /// [`ProxyError::NotExposed`] if the port has no registration.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    pub fn unexpose(&self, port: u16) -> Result<ExposedPort, ProxyError> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut entries = self.entries.write().expect("port registry lock poisoned");
        let removed = entries.remove(&port).ok_or(ProxyError::NotExposed(port))?;
        tracing::info!(port, "port unexposed");
        Ok(removed)
    }

    /// All registrations, ordered by port.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<ExposedPort> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let entries = self.entries.read().expect("port registry lock poisoned");
        let mut list: Vec<_> = entries.values().cloned().collect();
        list.sort_by_key(|e| e.port);
        list
    }

    /// Looks up one registration.
    ///
    /// # Panics
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get(&self, port: u16) -> Option<ExposedPort> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let entries = self.entries.read().expect("port registry lock poisoned");
        entries.get(&port).cloned()
    }

    /// Verifies a presented token against the port's registration.
    ///
    /// # Errors
    /// [`ProxyError::NotExposed`] when the port has no registration,
    /// [`ProxyError::InvalidToken`] on mismatch.
    pub fn verify_token(&self, port: u16, token: &str) -> Result<(), ProxyError> {
        let entry = self.get(port).ok_or(ProxyError::NotExposed(port))?;
        if entry.token == token {
            Ok(())
        } else {
            tracing::warn!(port, "proxy token mismatch");
            Err(ProxyError::InvalidToken(port))
        }
    }
}

/// Mints a token: SHA-256 over a fresh UUID, random bytes, and the port,
/// hex formatted and truncated. Constant for the registration lifetime.
fn mint_token(port: u16) -> String {
    use std::fmt::Write as _;

    let mut random = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(random);
    hasher.update(port.to_be_bytes());
    let digest = hasher.finalize();
    let mut token = String::with_capacity(TOKEN_LEN);
    for byte in digest.iter().take(TOKEN_LEN / 2) {
        let _ = write!(token, "{byte:02x}");
    }
    token
}
