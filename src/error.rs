//! Error types for ShopBridge
//!
//! This module provides the error type hierarchy using `thiserror`, plus the
//! mapping from errors to HTTP responses with stable JSON error codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// The main error type for ShopBridge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or disallowed shop domain supplied by the caller
    #[error("Invalid shop domain: {0}")]
    InvalidTenant(String),

    /// OAuth state (anti-forgery nonce) missing, expired, reused, or bound
    /// to a different shop — the caller must restart the flow
    #[error("Invalid state parameter")]
    InvalidState,

    /// The remote platform rejected the authorization-code exchange
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Webhook signature verification failed
    #[error("Invalid signature")]
    SignatureError(#[from] SignatureError),

    /// No installed credential for the named shop
    #[error("Shop not found: {0}")]
    TenantNotFound(String),

    /// A sync run exhausted its retry budget on a transient remote condition
    #[error("Sync failed for {kind}: {reason}")]
    SyncFailed {
        /// Resource kind that was being synced
        kind: String,
        /// What exhausted the retries
        reason: String,
    },

    /// A sync for this (shop, resource) pair is already in flight
    #[error("Sync already in progress for {shop}/{kind}")]
    ConcurrentSyncRejected {
        /// Shop domain holding the lease
        shop: String,
        /// Resource kind being synced
        kind: String,
    },

    /// Webhook topic outside the closed set this service dispatches on
    #[error("Unknown webhook topic: {0}")]
    UnknownTopic(String),

    /// Request body failed structural validation after signature acceptance
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Remote platform API errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error with message
    #[error("{0}")]
    Internal(String),
}

/// Webhook signature verification failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature header absent from the request
    #[error("missing signature header")]
    MissingHeader,

    /// Request body was empty
    #[error("empty body")]
    EmptyBody,

    /// Computed digest did not match the provided signature
    #[error("signature mismatch")]
    Mismatch,
}

/// Errors from the remote platform HTTP client
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Request throttled; the platform supplied a backoff hint
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the platform asked us to wait
        retry_after_secs: u64,
    },

    /// Server-side or network failure, safe to retry with backoff
    #[error("transient platform failure: {0}")]
    Transient(String),

    /// Credential rejected by the platform (401/403)
    #[error("platform rejected credential: status {0}")]
    Unauthorized(u16),

    /// Non-retryable API error
    #[error("platform API error: status {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body did not parse as the expected shape
    #[error("malformed platform response: {0}")]
    MalformedResponse(String),
}

impl PlatformError {
    /// Whether a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::RateLimited { .. } | PlatformError::Transient(_)
        )
    }

    /// Backoff hint in seconds, when the platform provided one
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PlatformError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts and connection resets are retryable; a reqwest error
        // without an HTTP status is treated the same way.
        PlatformError::Transient(err.to_string())
    }
}

impl Error {
    /// Create a generic internal error from a string
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Stable machine-readable error code for JSON bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTenant(_) => "invalid_tenant",
            Error::InvalidState => "invalid_state",
            Error::TokenExchangeFailed(_) => "token_exchange_failed",
            Error::SignatureError(_) => "invalid_signature",
            Error::TenantNotFound(_) => "shop_not_found",
            Error::SyncFailed { .. } => "sync_failed",
            Error::ConcurrentSyncRejected { .. } => "sync_in_progress",
            Error::UnknownTopic(_) => "unknown_topic",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::Platform(_) => "platform_error",
            Error::Json(_) => "invalid_json",
            Error::Io(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error surfaces as at the request boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidTenant(_)
            | Error::InvalidState
            | Error::InvalidPayload(_)
            | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::SignatureError(_) => StatusCode::UNAUTHORIZED,
            Error::TenantNotFound(_) => StatusCode::NOT_FOUND,
            Error::ConcurrentSyncRejected { .. } => StatusCode::CONFLICT,
            Error::TokenExchangeFailed(_) => StatusCode::BAD_GATEWAY,
            Error::UnknownTopic(_)
            | Error::SyncFailed { .. }
            | Error::Platform(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message for the JSON error body.
    ///
    /// Signature and tenant-lookup failures use the exact strings the
    /// platform integration contract expects.
    fn public_message(&self) -> String {
        match self {
            Error::SignatureError(_) => "Invalid signature".to_string(),
            Error::TenantNotFound(_) => "Shop not found".to_string(),
            // Never leak exchange internals to the browser
            Error::TokenExchangeFailed(_) => "Failed to exchange code for token".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.public_message(),
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}

/// Result type alias for ShopBridge operations
pub type Result<T> = std::result::Result<T, Error>;
