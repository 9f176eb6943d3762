//! Input validation for paths, ports, and sandbox identities.
//!
//! Every filesystem and git endpoint consults [`validate_path`] before
//! touching the filesystem; the proxy consults [`validate_port`] and
//! [`validate_sandbox_id`] before routing.

/// System path prefixes that are never valid operation targets.
const DENIED_PREFIXES: [&str; 9] =
    ["/etc", "/var", "/usr", "/bin", "/sbin", "/boot", "/dev", "/proc", "/sys"];

/// Ports the registry refuses to expose. 3000 is the control plane itself.
pub const RESERVED_PORTS: [u16; 2] = [3000, 8787];

/// Subdomain labels that can never be sandbox identities.
const RESERVED_NAMES: [&str; 6] = ["api", "www", "admin", "localhost", "internal", "proxy"];

/// A rejected path, port, or identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum GuardError {
    #[error("path cannot be empty")]
    EmptyPath,

    #[error("access to system path '{0}' is not allowed")]
    SystemPath(String),

    #[error("path traversal is not allowed: '{0}'")]
    Traversal(String),

    #[error("port {0} is outside the allowed range 1024-65535")]
    PortOutOfRange(u16),

    #[error("port {0} is reserved")]
    PortReserved(u16),

    #[error("invalid sandbox identity '{0}'")]
    InvalidIdentity(String),
}

/// Validates a filesystem or git target path.
///
/// Rejects the empty string, the filesystem root, system path prefixes,
/// and any path containing a `..` segment.
///
/// # Errors
/// Returns the specific [`GuardError`] variant describing the violation.
pub fn validate_path(path: &str) -> Result<(), GuardError> {
    if path.is_empty() {
        return Err(GuardError::EmptyPath);
    }
    if path == "/" {
        return Err(GuardError::SystemPath(path.to_owned()));
    }
    for prefix in DENIED_PREFIXES {
        // "/etc" and "/etc/..." are denied; "/etcetera" is not.
        if path == prefix || path.starts_with(&format!("{prefix}/")) {
            return Err(GuardError::SystemPath(path.to_owned()));
        }
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(GuardError::Traversal(path.to_owned()));
    }
    Ok(())
}

/// Validates a port number for exposure or proxying.
///
/// # Errors
/// Returns [`GuardError::PortOutOfRange`] for ports below 1024 (the range
/// type caps the upper bound) and [`GuardError::PortReserved`] for the
/// reserved set.
pub fn validate_port(port: u16) -> Result<(), GuardError> {
    if port < 1024 {
        return Err(GuardError::PortOutOfRange(port));
    }
    if RESERVED_PORTS.contains(&port) {
        return Err(GuardError::PortReserved(port));
    }
    Ok(())
}

/// Validates a sandbox identity as a DNS label.
///
/// Accepts 1-63 lowercase alphanumeric or hyphen characters with no
/// leading or trailing hyphen, excluding the reserved name list.
///
/// # Errors
/// Returns [`GuardError::InvalidIdentity`] on any violation.
pub fn validate_sandbox_id(id: &str) -> Result<(), GuardError> {
    let reject = || GuardError::InvalidIdentity(id.to_owned());
    if id.is_empty() || id.len() > 63 {
        return Err(reject());
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(reject());
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(reject());
    }
    if RESERVED_NAMES.contains(&id) {
        return Err(reject());
    }
    Ok(())
}
