//! Error rendering at the HTTP boundary.
//!
//! Every component raises typed failures; this is the single place they
//! become `{error, code, operation, httpStatus}` JSON responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use warden_core::{ApiError, Domain, ErrorCode};

/// A classified error ready to render.
#[derive(Debug)]
pub struct GatewayError(pub ApiError);

impl GatewayError {
    /// A generic 400 validation failure.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ApiError::new(Domain::Command, ErrorCode::InvalidRequest, message))
    }
}

impl From<ApiError> for GatewayError {
    fn from(api: ApiError) -> Self {
        Self(api)
    }
}

impl From<warden_core::GuardError> for GatewayError {
    fn from(err: warden_core::GuardError) -> Self {
        Self(err.into())
    }
}

impl From<warden_executor::ExecutorError> for GatewayError {
    fn from(err: warden_executor::ExecutorError) -> Self {
        Self(err.to_api_error())
    }
}

impl From<warden_process::ProcessError> for GatewayError {
    fn from(err: warden_process::ProcessError) -> Self {
        Self(err.to_api_error())
    }
}

impl From<warden_proxy::ProxyError> for GatewayError {
    fn from(err: warden_proxy::ProxyError) -> Self {
        Self(err.to_api_error())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}
