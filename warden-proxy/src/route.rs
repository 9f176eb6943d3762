//! Subdomain route extraction and preview URL construction.
//!
//! Subdomain hosts look like `<port>-<sandboxId>-<token>.<domain>`. The
//! port is the first hyphen-separated segment of the first label and the
//! token the last, so sandbox identities keep their interior hyphens.

use hyper::Uri;

use warden_core::{validate_port, validate_sandbox_id};

use crate::ProxyError;

/// A parsed and validated subdomain route.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ProxyRoute {
    pub port: u16,
    pub sandbox_id: String,
    pub token: String,
}

/// Parses a subdomain host into a route.
///
/// Validation order: shape, then port, then sandbox identity. Token
/// verification happens against the registry afterwards.
///
/// # Errors
/// [`ProxyError::MalformedSubdomain`] when the first label does not
/// decompose, plus the guard's port/identity errors.
pub fn parse_subdomain_host(host: &str) -> Result<ProxyRoute, ProxyError> {
    // Host headers may carry an explicit port.
    let host = host.split(':').next().unwrap_or(host);
    let label = host
        .split('.')
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ProxyError::MalformedSubdomain(host.to_owned()))?;

    let segments: Vec<&str> = label.split('-').collect();
    if segments.len() < 3 {
        return Err(ProxyError::MalformedSubdomain(host.to_owned()));
    }
    let port: u16 = segments[0]
        .parse()
        .map_err(|_| ProxyError::MalformedSubdomain(host.to_owned()))?;
    let token = segments[segments.len() - 1];
    let sandbox_id = segments[1..segments.len() - 1].join("-");
    if token.is_empty() || sandbox_id.is_empty() {
        return Err(ProxyError::MalformedSubdomain(host.to_owned()));
    }

    validate_port(port)?;
    validate_sandbox_id(&sandbox_id)?;

    Ok(ProxyRoute { port, sandbox_id, token: token.to_owned() })
}

/// Builds the loopback target for a proxied request.
///
/// Assembly goes through the `Uri` builder so a malformed path can never
/// smuggle its way into the request line.
///
/// # Errors
/// [`ProxyError::Request`] if the components do not form a valid URI.
pub fn loopback_uri(port: u16, path_and_query: &str) -> Result<Uri, ProxyError> {
    let path_and_query = if path_and_query.is_empty() { "/" } else { path_and_query };
    Uri::builder()
        .scheme("http")
        .authority(format!("127.0.0.1:{port}"))
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Request(format!("loopback uri: {e}")))
}

/// Builds the public preview URL for an exposed port.
///
/// Loopback hosts get `http`, everything else `https`. Port and identity
/// are validated before assembly.
///
/// # Errors
/// Guard errors for port/identity, [`ProxyError::Request`] if the
/// resulting URI is invalid.
pub fn preview_url(port: u16, sandbox_id: &str, request_host: &str) -> Result<String, ProxyError> {
    validate_port(port)?;
    validate_sandbox_id(sandbox_id)?;
    let bare_host = request_host.split(':').next().unwrap_or(request_host);
    let scheme = if is_loopback_host(bare_host) { "http" } else { "https" };
    let uri = Uri::builder()
        .scheme(scheme)
        .authority(format!("{port}-{sandbox_id}.{request_host}"))
        .path_and_query("/")
        .build()
        .map_err(|e| ProxyError::Request(format!("preview uri: {e}")))?;
    Ok(uri.to_string())
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "::1"
}
