use crate::models::listing::ListingStatus;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Every way a listing workflow can fail. Callers branch on the variant (or
/// on [`ListingError::code`]), never on the message text.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("listing `{0}` not found")]
    ListingNotFound(Uuid),
    #[error("cannot transition listing from {from} to {to}")]
    InvalidStateTransition {
        from: ListingStatus,
        to: ListingStatus,
    },
    #[error(
        "Cannot add {attempted} photo(s). Listing already has {current} photo(s) and maximum allowed is {max}"
    )]
    PhotoLimitExceeded {
        max: usize,
        current: usize,
        attempted: usize,
    },
    #[error("{0}")]
    InvalidPhotoFormat(String),
    #[error("idempotency key `{token}` was already used for listing `{listing_id}`")]
    IdempotencyConflict { token: String, listing_id: Uuid },
    #[error("idempotency key `{0}` already exists")]
    DuplicateKey(String),
    #[error("listing `{0}` was modified concurrently; reload and retry")]
    ConcurrentModification(Uuid),
    #[error("storage failure: {0}")]
    StorageFailure(String),
    /// The publish committed but its token could not be recorded.
    #[error("listing `{listing_id}` was published but idempotency key `{token}` was not recorded: {reason}")]
    IdempotencyRecordFailed {
        listing_id: Uuid,
        token: String,
        reason: String,
    },
}

pub type ListingResult<T> = Result<T, ListingError>;

impl ListingError {
    /// Stable, machine-readable category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ListingNotFound(_) => "listing_not_found",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::PhotoLimitExceeded { .. } => "photo_limit_exceeded",
            Self::InvalidPhotoFormat(_) => "invalid_photo_format",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::StorageFailure(_) => "storage_failure",
            Self::IdempotencyRecordFailed { .. } => "idempotency_record_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::PhotoLimitExceeded { .. } => StatusCode::BAD_REQUEST,
            Self::ListingNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidStateTransition { .. }
            | Self::IdempotencyConflict { .. }
            | Self::DuplicateKey(_)
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::InvalidPhotoFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StorageFailure(_) | Self::IdempotencyRecordFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// A lightweight wrapper for errors returned from HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ListingError> for AppError {
    fn from(err: ListingError) -> Self {
        match &err {
            ListingError::StorageFailure(_) | ListingError::IdempotencyRecordFailed { .. } => {
                tracing::error!(code = err.code(), "{}", err);
            }
            _ => tracing::warn!(code = err.code(), "{}", err),
        }
        AppError::new(err.status(), err.code(), err.to_string())
    }
}
