//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::billing::WebhookError;
use crate::credentials::CredentialError;
use crate::credits::CreditError;
use crate::error::Error;
use crate::media::MediaError;

/// API error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 401 Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// Create a 402 Payment Required error.
    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_CREDITS",
            message,
        )
    }

    /// Create a 403 Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Create a 502 Bad Gateway error.
    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, code, message)
    }

    /// Create a 503 Service Unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                ApiError::not_found(format!("{} with id '{}' not found", entity_type, id))
            }
            Error::Validation(msg) => ApiError::validation(msg),
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::DatabaseSqlx(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::internal("Database error occurred")
            }
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotConnected { provider } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_CONNECTED",
                format!("No {provider} account connected"),
            ),
            CredentialError::AuthExpired { reason } => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTH_EXPIRED",
                format!("Re-authorization required: {reason}"),
            ),
            CredentialError::UpstreamUnavailable { reason } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UPSTREAM_UNAVAILABLE",
                format!("Provider unavailable: {reason}"),
            ),
            CredentialError::UnsupportedProvider(provider) => {
                ApiError::bad_request(format!("Provider {provider} is not configured"))
            }
            CredentialError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::internal("Database error occurred")
            }
            CredentialError::Parse(msg) => {
                tracing::error!("Token response parse error: {}", msg);
                ApiError::bad_gateway("UPSTREAM_PROTOCOL_ERROR", "Provider returned a malformed response")
            }
        }
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientCredits => {
                ApiError::payment_required("Insufficient credits")
            }
            CreditError::Unauthorized { account_id } => ApiError::forbidden(format!(
                "Account {account_id} is not accessible with this key"
            )),
            CreditError::UnknownAccount { account_id } => {
                ApiError::not_found(format!("Account {account_id} not found"))
            }
            CreditError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::internal("Database error occurred")
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match &err {
            WebhookError::InvalidSignature(e) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", e.to_string())
            }
            WebhookError::Malformed(msg) => {
                ApiError::new(StatusCode::BAD_REQUEST, "MALFORMED_EVENT", msg.clone())
            }
            WebhookError::UnknownOwner { event_id } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "UNKNOWN_OWNER",
                format!("Event {event_id} carries no owner reference"),
            ),
            // 5xx so the payment provider redelivers; the idempotency marker
            // makes redelivery harmless.
            WebhookError::Credit(e) => {
                tracing::error!("Webhook credit error: {}", e);
                ApiError::internal("Credit grant failed")
            }
            WebhookError::Database(e) => {
                tracing::error!("Webhook database error: {}", e);
                ApiError::internal("Database error occurred")
            }
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::DownloadFailed { url, reason } => ApiError::bad_gateway(
                "DOWNLOAD_FAILED",
                format!("Could not download {url}: {reason}"),
            ),
            MediaError::RehostFailed { reason } => {
                ApiError::bad_gateway("REHOST_FAILED", format!("Could not rehost content: {reason}"))
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
