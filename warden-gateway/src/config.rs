//! Gateway configuration from the environment.

use warden_core::validate_sandbox_id;

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GatewayConfig {
    /// Listen address of the control plane.
    pub listen_addr: String,
    /// DNS-label identity of this sandbox, used in preview URLs and
    /// verified against subdomain routes.
    pub sandbox_id: String,
    /// Root directory for execution contexts and relative file targets.
    pub workspace_dir: String,
}

impl GatewayConfig {
    /// Reads `WARDEN_LISTEN_ADDR`, `WARDEN_SANDBOX_ID`, and
    /// `WARDEN_WORKSPACE_DIR`, falling back to the container defaults.
    ///
    /// # Errors
    /// Returns the invalid identity as an error string when
    /// `WARDEN_SANDBOX_ID` fails DNS-label validation; startup must not
    /// proceed with an unroutable identity.
    pub fn from_env() -> Result<Self, String> {
        let listen_addr =
            std::env::var("WARDEN_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());
        let sandbox_id =
            std::env::var("WARDEN_SANDBOX_ID").unwrap_or_else(|_| "sandbox".to_owned());
        let workspace_dir =
            std::env::var("WARDEN_WORKSPACE_DIR").unwrap_or_else(|_| "/workspace".to_owned());
        validate_sandbox_id(&sandbox_id).map_err(|e| e.to_string())?;
        Ok(Self { listen_addr, sandbox_id, workspace_dir })
    }

    /// A fixed configuration for tests.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_owned(),
            sandbox_id: "test-sandbox".to_owned(),
            workspace_dir: "/tmp".to_owned(),
        }
    }
}
