//! Error classification, the single source of truth for error responses.
//!
//! Leaf components raise typed failures; this module maps OS-level and
//! subprocess errors onto a stable `{error, code, operation, httpStatus}`
//! taxonomy that the gateway renders at the HTTP boundary.

use serde::Serialize;

// Linux errno values. The control plane only ever runs inside a Linux
// container, so matching raw numbers is safe where ErrorKind has no
// stable variant.
const EPERM: i32 = 1;
const ESRCH: i32 = 3;
const EBUSY: i32 = 16;
const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;
const ENOSPC: i32 = 28;
const EROFS: i32 = 30;
const ENAMETOOLONG: i32 = 36;
const ELOOP: i32 = 40;
const EADDRINUSE: i32 = 98;
const ECONNREFUSED: i32 = 111;

/// Operation domain an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    File,
    Command,
    Process,
    Port,
    Git,
    Interpreter,
}

impl Domain {
    /// Uppercase prefix for the fallback `<DOMAIN>_ERROR` code.
    #[must_use]
    pub fn as_upper(self) -> &'static str {
        match self {
            Domain::File => "FILE",
            Domain::Command => "COMMAND",
            Domain::Process => "PROCESS",
            Domain::Port => "PORT",
            Domain::Git => "GIT",
            Domain::Interpreter => "INTERPRETER",
        }
    }
}

/// Stable error codes of the six-fold taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    // validation
    InvalidRequest,
    InvalidPath,
    InvalidPort,
    PortReserved,
    InvalidSubdomain,
    InvalidSandboxId,
    DangerousCommand,
    NameTooLong,
    TooManyLinks,
    IsDirectory,
    NotDirectory,
    // not-found
    FileNotFound,
    CommandNotFound,
    ProcessNotFound,
    ContextNotFound,
    PortNotExposed,
    InvalidToken,
    GitRepositoryNotFound,
    GitBranchNotFound,
    // conflict
    FileExists,
    ProcessExists,
    PortAlreadyExposed,
    PortInUse,
    // permission
    PermissionDenied,
    ProcessPermissionDenied,
    ReadOnly,
    GitAuthFailed,
    // upstream-failure
    InterpreterNotReady,
    ExecutionTimeout,
    ServiceNotResponding,
    GitNetworkError,
    // resource pressure
    NoSpace,
    TooManyFiles,
    ResourceBusy,
    // internal
    GitCloneFailed,
    GitCheckoutFailed,
    Internal,
}

impl ErrorCode {
    /// HTTP status the code renders with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidRequest
            | ErrorCode::InvalidPath
            | ErrorCode::InvalidPort
            | ErrorCode::PortReserved
            | ErrorCode::InvalidSubdomain
            | ErrorCode::InvalidSandboxId
            | ErrorCode::DangerousCommand
            | ErrorCode::NameTooLong
            | ErrorCode::TooManyLinks
            | ErrorCode::IsDirectory
            | ErrorCode::NotDirectory => 400,
            ErrorCode::FileNotFound
            | ErrorCode::CommandNotFound
            | ErrorCode::ProcessNotFound
            | ErrorCode::ContextNotFound
            | ErrorCode::PortNotExposed
            | ErrorCode::InvalidToken
            | ErrorCode::GitRepositoryNotFound
            | ErrorCode::GitBranchNotFound => 404,
            ErrorCode::FileExists
            | ErrorCode::ProcessExists
            | ErrorCode::PortAlreadyExposed
            | ErrorCode::PortInUse => 409,
            ErrorCode::PermissionDenied
            | ErrorCode::ProcessPermissionDenied
            | ErrorCode::ReadOnly => 403,
            ErrorCode::GitAuthFailed => 401,
            ErrorCode::InterpreterNotReady => 503,
            ErrorCode::ExecutionTimeout => 504,
            ErrorCode::ServiceNotResponding | ErrorCode::GitNetworkError => 502,
            ErrorCode::NoSpace => 507,
            ErrorCode::TooManyFiles => 429,
            ErrorCode::ResourceBusy => 423,
            ErrorCode::GitCloneFailed | ErrorCode::GitCheckoutFailed | ErrorCode::Internal => 500,
        }
    }

    /// The SCREAMING_SNAKE wire code. `Internal` renders as
    /// `<DOMAIN>_ERROR`, so it takes the domain.
    #[must_use]
    pub fn wire_code(self, domain: Domain) -> String {
        let fixed = match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::InvalidPort => "INVALID_PORT",
            ErrorCode::PortReserved => "PORT_RESERVED",
            ErrorCode::InvalidSubdomain => "INVALID_SUBDOMAIN",
            ErrorCode::InvalidSandboxId => "INVALID_SANDBOX_ID",
            ErrorCode::DangerousCommand => "DANGEROUS_COMMAND",
            ErrorCode::NameTooLong => "NAME_TOO_LONG",
            ErrorCode::TooManyLinks => "TOO_MANY_LINKS",
            ErrorCode::IsDirectory => "IS_DIRECTORY",
            ErrorCode::NotDirectory => "NOT_DIRECTORY",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::CommandNotFound => "COMMAND_NOT_FOUND",
            ErrorCode::ProcessNotFound => "PROCESS_NOT_FOUND",
            ErrorCode::ContextNotFound => "CONTEXT_NOT_FOUND",
            ErrorCode::PortNotExposed => "PORT_NOT_EXPOSED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::GitRepositoryNotFound => "GIT_REPOSITORY_NOT_FOUND",
            ErrorCode::GitBranchNotFound => "GIT_BRANCH_NOT_FOUND",
            ErrorCode::FileExists => "FILE_EXISTS",
            ErrorCode::ProcessExists => "PROCESS_EXISTS",
            ErrorCode::PortAlreadyExposed => "PORT_ALREADY_EXPOSED",
            ErrorCode::PortInUse => "PORT_IN_USE",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ProcessPermissionDenied => "PROCESS_PERMISSION_DENIED",
            ErrorCode::ReadOnly => "READ_ONLY",
            ErrorCode::GitAuthFailed => "GIT_AUTH_FAILED",
            ErrorCode::InterpreterNotReady => "INTERPRETER_NOT_READY",
            ErrorCode::ExecutionTimeout => "EXECUTION_TIMEOUT",
            ErrorCode::ServiceNotResponding => "SERVICE_NOT_RESPONDING",
            ErrorCode::GitNetworkError => "GIT_NETWORK_ERROR",
            ErrorCode::NoSpace => "NO_SPACE",
            ErrorCode::TooManyFiles => "TOO_MANY_FILES",
            ErrorCode::ResourceBusy => "RESOURCE_BUSY",
            ErrorCode::GitCloneFailed => "GIT_CLONE_FAILED",
            ErrorCode::GitCheckoutFailed => "GIT_CHECKOUT_FAILED",
            ErrorCode::Internal => return format!("{}_ERROR", domain.as_upper()),
        };
        fixed.to_owned()
    }
}

/// The structured error response rendered at the HTTP boundary.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Stable wire code, e.g. `FILE_NOT_FOUND`.
    pub code: String,
    /// Operation domain the error belongs to.
    pub operation: Domain,
    #[serde(rename = "httpStatus")]
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Seconds the caller should wait before retrying, on
    /// interpreter-not-ready responses.
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    /// Builds an error response from a code and message.
    #[must_use]
    pub fn new(domain: Domain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.wire_code(domain),
            operation: domain,
            http_status: code.http_status(),
            details: None,
            path: None,
            context: None,
            retry_after: None,
        }
    }

    /// Attaches the path the operation targeted.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches free-form detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attaches structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches a retry hint (interpreter-not-ready responses).
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

/// Maps an I/O error onto the taxonomy for the given domain.
///
/// ENOENT means "file not found" for file operations but "command not
/// found" for command spawns; EPERM on a process means a signalling
/// failure rather than a filesystem one.
#[must_use]
pub fn classify_io(domain: Domain, err: &std::io::Error) -> ErrorCode {
    if let Some(errno) = err.raw_os_error() {
        match errno {
            EISDIR => return ErrorCode::IsDirectory,
            ENOTDIR => return ErrorCode::NotDirectory,
            ENOSPC => return ErrorCode::NoSpace,
            EMFILE | ENFILE => return ErrorCode::TooManyFiles,
            EBUSY => return ErrorCode::ResourceBusy,
            EROFS => return ErrorCode::ReadOnly,
            ENAMETOOLONG => return ErrorCode::NameTooLong,
            ELOOP => return ErrorCode::TooManyLinks,
            ESRCH => return ErrorCode::ProcessNotFound,
            EADDRINUSE => return ErrorCode::PortInUse,
            ECONNREFUSED => return ErrorCode::ServiceNotResponding,
            EPERM if domain == Domain::Process => return ErrorCode::ProcessPermissionDenied,
            _ => {}
        }
    }
    match err.kind() {
        std::io::ErrorKind::NotFound => match domain {
            Domain::Command => ErrorCode::CommandNotFound,
            Domain::Process => ErrorCode::ProcessNotFound,
            _ => ErrorCode::FileNotFound,
        },
        std::io::ErrorKind::PermissionDenied => {
            if domain == Domain::Process {
                ErrorCode::ProcessPermissionDenied
            } else {
                ErrorCode::PermissionDenied
            }
        }
        std::io::ErrorKind::AlreadyExists => ErrorCode::FileExists,
        std::io::ErrorKind::ConnectionRefused => ErrorCode::ServiceNotResponding,
        std::io::ErrorKind::AddrInUse => ErrorCode::PortInUse,
        _ => ErrorCode::Internal,
    }
}

/// Phase of a git operation, for fallback classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitPhase {
    Clone,
    Checkout,
}

/// Classifies a git subprocess failure from its stderr text.
///
/// `branch` is the branch the caller asked for, if any; a "remote branch
/// not found" message only maps to [`ErrorCode::GitBranchNotFound`] when
/// the branch is known.
#[must_use]
pub fn classify_git(stderr: &str, branch: Option<&str>, phase: GitPhase) -> ErrorCode {
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("403")
    {
        return ErrorCode::GitAuthFailed;
    }
    if stderr.contains("Repository not found")
        || stderr.contains("404")
        || stderr.contains("does not exist")
    {
        return ErrorCode::GitRepositoryNotFound;
    }
    if branch.is_some() && stderr.contains("Remote branch") && stderr.contains("not found") {
        return ErrorCode::GitBranchNotFound;
    }
    if stderr.contains("Could not resolve host")
        || stderr.contains("Connection refused")
        || stderr.contains("timeout")
    {
        return ErrorCode::GitNetworkError;
    }
    match phase {
        GitPhase::Clone => ErrorCode::GitCloneFailed,
        GitPhase::Checkout => ErrorCode::GitCheckoutFailed,
    }
}

impl From<crate::guard::GuardError> for ApiError {
    fn from(err: crate::guard::GuardError) -> Self {
        use crate::guard::GuardError;
        let (domain, code) = match &err {
            GuardError::EmptyPath | GuardError::SystemPath(_) | GuardError::Traversal(_) => {
                (Domain::File, ErrorCode::InvalidPath)
            }
            GuardError::PortOutOfRange(_) => (Domain::Port, ErrorCode::InvalidPort),
            GuardError::PortReserved(_) => (Domain::Port, ErrorCode::PortReserved),
            GuardError::InvalidIdentity(_) => (Domain::Port, ErrorCode::InvalidSandboxId),
        };
        ApiError::new(domain, code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errno_err(errno: i32) -> std::io::Error {
        std::io::Error::from_raw_os_error(errno)
    }

    #[test]
    fn enoent_maps_per_domain() {
        let err = errno_err(2);
        assert_eq!(classify_io(Domain::File, &err), ErrorCode::FileNotFound);
        assert_eq!(classify_io(Domain::Command, &err), ErrorCode::CommandNotFound);
    }

    #[test]
    fn filesystem_errnos_map_to_table() {
        assert_eq!(classify_io(Domain::File, &errno_err(13)), ErrorCode::PermissionDenied);
        assert_eq!(classify_io(Domain::File, &errno_err(EISDIR)), ErrorCode::IsDirectory);
        assert_eq!(classify_io(Domain::File, &errno_err(ENOTDIR)), ErrorCode::NotDirectory);
        assert_eq!(classify_io(Domain::File, &errno_err(17)), ErrorCode::FileExists);
        assert_eq!(classify_io(Domain::File, &errno_err(ENOSPC)), ErrorCode::NoSpace);
        assert_eq!(classify_io(Domain::File, &errno_err(EMFILE)), ErrorCode::TooManyFiles);
        assert_eq!(classify_io(Domain::File, &errno_err(ENFILE)), ErrorCode::TooManyFiles);
        assert_eq!(classify_io(Domain::File, &errno_err(EBUSY)), ErrorCode::ResourceBusy);
        assert_eq!(classify_io(Domain::File, &errno_err(EROFS)), ErrorCode::ReadOnly);
        assert_eq!(classify_io(Domain::File, &errno_err(ENAMETOOLONG)), ErrorCode::NameTooLong);
        assert_eq!(classify_io(Domain::File, &errno_err(ELOOP)), ErrorCode::TooManyLinks);
    }

    #[test]
    fn process_errnos_map_to_table() {
        assert_eq!(classify_io(Domain::Process, &errno_err(ESRCH)), ErrorCode::ProcessNotFound);
        assert_eq!(
            classify_io(Domain::Process, &errno_err(EPERM)),
            ErrorCode::ProcessPermissionDenied
        );
    }

    #[test]
    fn network_errnos_map_to_table() {
        assert_eq!(
            classify_io(Domain::Port, &errno_err(ECONNREFUSED)),
            ErrorCode::ServiceNotResponding
        );
        assert_eq!(classify_io(Domain::Port, &errno_err(EADDRINUSE)), ErrorCode::PortInUse);
    }

    #[test]
    fn http_statuses_match_table() {
        assert_eq!(ErrorCode::FileNotFound.http_status(), 404);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::FileExists.http_status(), 409);
        assert_eq!(ErrorCode::NoSpace.http_status(), 507);
        assert_eq!(ErrorCode::TooManyFiles.http_status(), 429);
        assert_eq!(ErrorCode::ResourceBusy.http_status(), 423);
        assert_eq!(ErrorCode::GitAuthFailed.http_status(), 401);
        assert_eq!(ErrorCode::ServiceNotResponding.http_status(), 502);
        assert_eq!(ErrorCode::InterpreterNotReady.http_status(), 503);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn git_stderr_classification() {
        assert_eq!(
            classify_git("fatal: Authentication failed for 'https://x'", None, GitPhase::Clone),
            ErrorCode::GitAuthFailed
        );
        assert_eq!(
            classify_git("ERROR: Repository not found.", None, GitPhase::Clone),
            ErrorCode::GitRepositoryNotFound
        );
        assert_eq!(
            classify_git("fatal: Remote branch dev not found in upstream", Some("dev"), GitPhase::Checkout),
            ErrorCode::GitBranchNotFound
        );
        assert_eq!(
            classify_git("fatal: Remote branch dev not found in upstream", None, GitPhase::Clone),
            ErrorCode::GitCloneFailed,
            "branch message without a known branch falls back to phase"
        );
        assert_eq!(
            classify_git("fatal: Could not resolve host: github.com", None, GitPhase::Clone),
            ErrorCode::GitNetworkError
        );
        assert_eq!(
            classify_git("fatal: something odd", None, GitPhase::Checkout),
            ErrorCode::GitCheckoutFailed
        );
    }

    #[test]
    fn internal_code_renders_domain_fallback() {
        assert_eq!(ErrorCode::Internal.wire_code(Domain::Git), "GIT_ERROR");
        assert_eq!(ErrorCode::Internal.wire_code(Domain::File), "FILE_ERROR");
        assert_eq!(ErrorCode::FileNotFound.wire_code(Domain::File), "FILE_NOT_FOUND");
    }

    #[test]
    fn api_error_serializes_camel_case_status() {
        let err = ApiError::new(Domain::File, ErrorCode::FileNotFound, "no such file")
            .with_path("/workspace/missing.txt");
        let json = match serde_json::to_value(&err) {
            Ok(v) => v,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert_eq!(json["code"], "FILE_NOT_FOUND");
        assert_eq!(json["httpStatus"], 404);
        assert_eq!(json["operation"], "file");
        assert_eq!(json["path"], "/workspace/missing.txt");
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn guard_error_converts_to_400() {
        let api: ApiError = crate::guard::GuardError::Traversal("/tmp/..".to_owned()).into();
        assert_eq!(api.http_status, 400);
        assert_eq!(api.code, "INVALID_PATH");
    }
}
