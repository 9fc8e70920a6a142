//! Request-level error classification.
//!
//! Every failure a handler can hit ends up in one of three buckets, each with its own
//! status code so callers can tell "your code was bad or expired" from "we are broken":
//!
//! | kind | status | raised for |
//! | --- | --- | --- |
//! | `authentication_failed` | 401 | provider exchange, key loading, rejected bearer tokens |
//! | `invalid_request` | 400 | malformed body or query, rejected before any provider call |
//! | `server_error` | 500 | anything else; the detail is logged, not returned |

use crate::discord::ExchangeError;
use crate::issuer::TokenError;
use crate::keys::KeyLoadError;
use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Internal(String),
}

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// One of `authentication_failed`, `invalid_request`, `server_error`
    pub error: String,
    /// Human-readable description
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Authentication(_) => "authentication_failed",
            ApiError::Validation(_) => "invalid_request",
            ApiError::Internal(_) => "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.kind().to_string();
        let detail = match self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "Internal error while handling request");
                "Internal error".to_string()
            }
            ApiError::Authentication(detail) => {
                tracing::warn!(%detail, "Authentication failed");
                detail
            }
            ApiError::Validation(detail) => {
                tracing::debug!(%detail, "Rejected malformed request");
                detail
            }
        };
        (status, Json(ErrorResponse { error, detail })).into_response()
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        ApiError::Authentication(err.to_string())
    }
}

impl From<KeyLoadError> for ApiError {
    fn from(err: KeyLoadError) -> Self {
        ApiError::Authentication(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => ApiError::Internal(err.to_string()),
            TokenError::Invalid(_) => ApiError::Authentication(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
