//! Response envelopes and error mapping for all ogw-daemon HTTP endpoints.
//!
//! Success payloads (`LoginProfile`, `OrderSummary`) live in `ogw-schemas`;
//! this module owns the error envelope and the taxonomy-to-status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ogw_auth::AuthError;
use ogw_orders::WorkflowError;
use ogw_resolver::ResolveError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /api/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Error body shape shared by every failing endpoint: a short title, a
/// human-readable message, and the taxonomy status. On the login path the
/// wire status can differ from `http_status` (see `routes::api_login`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub title: String,
    pub message: String,
    pub http_status: u16,
}

/// A failed request: the envelope plus the HTTP status actually sent.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub wire_status: StatusCode,
    pub body: ErrorBody,
}

impl ApiFailure {
    pub fn new(status: StatusCode, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            wire_status: status,
            body: ErrorBody {
                title: title.into(),
                message: message.into(),
                http_status: status.as_u16(),
            },
        }
    }

    /// Malformed request body rejected by strict JSON parsing.
    pub fn bad_request(err: &serde_json::Error) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "bad request",
            format!("invalid request body: {err}"),
        )
    }

    pub fn not_implemented(what: &str) -> Self {
        Self::new(
            StatusCode::NOT_IMPLEMENTED,
            "not implemented",
            format!("{what} is not implemented"),
        )
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.wire_status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Taxonomy mapping
// ---------------------------------------------------------------------------

impl From<AuthError> for ApiFailure {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        let (status, title) = match &err {
            AuthError::MissingCredentials => (StatusCode::FORBIDDEN, "missing error"),
            AuthError::AccessDenied => (StatusCode::UNAUTHORIZED, "Access denied"),
            AuthError::AccessError(_) => (StatusCode::FORBIDDEN, "Access error"),
            AuthError::InvalidDatabase(_) => (StatusCode::FORBIDDEN, "wrong database name"),
            AuthError::AuthenticationFailed => (StatusCode::UNAUTHORIZED, "authentication failed"),
            AuthError::TokenMissing => (StatusCode::UNAUTHORIZED, "access_token_not_found"),
            AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "access_token"),
            AuthError::Store(_) => (StatusCode::FORBIDDEN, "Internal Server Error"),
        };
        Self::new(status, title, message)
    }
}

impl From<ResolveError> for ApiFailure {
    fn from(err: ResolveError) -> Self {
        let message = err.to_string();
        let (status, title) = match &err {
            ResolveError::InvalidPartner(_) => (StatusCode::UNAUTHORIZED, "invalid partner"),
            ResolveError::InvalidArea(_) => (StatusCode::UNAUTHORIZED, "invalid area"),
            ResolveError::InvalidProduct(_) => (StatusCode::UNAUTHORIZED, "invalid product"),
            ResolveError::Store(_) => (StatusCode::FORBIDDEN, "Internal Server Error"),
        };
        Self::new(status, title, message)
    }
}

impl From<WorkflowError> for ApiFailure {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Resolve(resolve) => resolve.into(),
            other => Self::new(
                StatusCode::FORBIDDEN,
                "Internal Server Error",
                other.to_string(),
            ),
        }
    }
}
