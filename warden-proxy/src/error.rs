//! Error types for the proxy crate.

use warden_core::{ApiError, Domain, ErrorCode};

/// Errors raised by the port registry and the proxy router.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// Port outside 1024-65535.
    #[error("port {0} is outside the allowed range 1024-65535")]
    InvalidPort(u16),

    /// Port in the reserved set (control plane included).
    #[error("port {0} is reserved")]
    ReservedPort(u16),

    /// The port already has a registration.
    #[error("port {0} is already exposed")]
    AlreadyExposed(u16),

    /// No registration for the port.
    #[error("port {0} is not exposed")]
    NotExposed(u16),

    /// Token does not match the port's registration.
    #[error("invalid token for port {0}")]
    InvalidToken(u16),

    /// The subdomain host did not parse as `<port>-<sandbox>-<token>`.
    #[error("malformed proxy subdomain: {0}")]
    MalformedSubdomain(String),

    /// The sandbox identity failed validation.
    #[error("invalid sandbox identity '{0}'")]
    InvalidSandboxId(String),

    /// The loopback service did not accept the connection.
    #[error("service on port {port} is not responding: {reason}")]
    UpstreamUnavailable { port: u16, reason: String },

    /// Request or URI construction failed.
    #[error("proxy request error: {0}")]
    Request(String),
}

impl ProxyError {
    /// Renders the failure through the shared classifier.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        let code = match self {
            ProxyError::InvalidPort(_) => ErrorCode::InvalidPort,
            ProxyError::ReservedPort(_) => ErrorCode::PortReserved,
            ProxyError::AlreadyExposed(_) => ErrorCode::PortAlreadyExposed,
            ProxyError::NotExposed(_) => ErrorCode::PortNotExposed,
            ProxyError::InvalidToken(_) => ErrorCode::InvalidToken,
            ProxyError::MalformedSubdomain(_) => ErrorCode::InvalidSubdomain,
            ProxyError::InvalidSandboxId(_) => ErrorCode::InvalidSandboxId,
            ProxyError::UpstreamUnavailable { .. } => ErrorCode::ServiceNotResponding,
            ProxyError::Request(_) => ErrorCode::Internal,
        };
        ApiError::new(Domain::Port, code, self.to_string())
    }
}

impl From<warden_core::GuardError> for ProxyError {
    fn from(err: warden_core::GuardError) -> Self {
        match err {
            warden_core::GuardError::PortOutOfRange(port) => ProxyError::InvalidPort(port),
            warden_core::GuardError::PortReserved(port) => ProxyError::ReservedPort(port),
            warden_core::GuardError::InvalidIdentity(id) => ProxyError::InvalidSandboxId(id),
            other => ProxyError::Request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_renders_404() {
        let api = ProxyError::InvalidToken(8080).to_api_error();
        assert_eq!(api.http_status, 404);
        assert_eq!(api.code, "INVALID_TOKEN");
    }

    #[test]
    fn duplicate_exposure_renders_409() {
        let api = ProxyError::AlreadyExposed(8080).to_api_error();
        assert_eq!(api.http_status, 409);
        assert_eq!(api.code, "PORT_ALREADY_EXPOSED");
    }

    #[test]
    fn upstream_failure_renders_502() {
        let api = ProxyError::UpstreamUnavailable {
            port: 8080,
            reason: "connection refused".to_owned(),
        }
        .to_api_error();
        assert_eq!(api.http_status, 502);
        assert_eq!(api.code, "SERVICE_NOT_RESPONDING");
    }
}
