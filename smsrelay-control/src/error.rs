//! Error types for the control surface, and their HTTP translation.
//!
//! The control surface is the one place a typed error is turned into an
//! HTTP status and JSON body; nowhere upstream stringifies and discards a
//! `DispatchError`/`StoreError`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use smsrelay_common::ValidationError;
use smsrelay_dispatch::DispatchError;
use smsrelay_store::StoreError;
use thiserror::Error;

/// Errors the control surface's handlers can produce, before translation
/// into an HTTP response.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid submission: {0}")]
    Validation(#[from] ValidationError),
    #[error("message not found")]
    NotFound,
    #[error("illegal transition: {0}")]
    Conflict(String),
    #[error("queue depth at or above the configured high-water mark")]
    Overloaded,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControlError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Dispatch(err) => {
                if err.is_not_found() {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            Self::Store(err) => {
                if err.is_not_found() {
                    StatusCode::NOT_FOUND
                } else if err.is_conflict() {
                    StatusCode::CONFLICT
                } else if matches!(err, StoreError::CapacityExceeded(_, _)) {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }
}

/// The JSON body returned alongside [`ControlError::status`].
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "control surface internal error");
        }
        (status, Json(ApiError {
            error: self.to_string(),
        }))
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
