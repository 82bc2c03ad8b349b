use crate::response::ApiResponse;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Failures of the group operations, as reported to their callers.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("This group is full: a group can have at most {max_members} members.")]
    CapacityExceeded { max_members: i32 },

    #[error(
        "Groups for this assignment are managed by your consultant. Please contact your consultant to change your group."
    )]
    ConsultantManaged,

    #[error("{0}")]
    AlreadyGrouped(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for GroupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => GroupError::NotFound(message),
            StoreError::PermissionDenied(message) => GroupError::PermissionDenied(message),
            other => GroupError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String), // 400

    #[error("Forbidden: {0}")]
    Forbidden(String), // 403

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    #[error("Conflict: {0}")]
    Conflict(String), // 409

    #[error("Internal Server Error: {0}")]
    InternalServerError(#[from] anyhow::Error), // 500
}

impl From<GroupError> for AppError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::NotFound(message) => AppError::NotFound(message),
            GroupError::PermissionDenied(message) => AppError::Forbidden(message),
            e @ GroupError::ConsultantManaged => AppError::Forbidden(e.to_string()),
            e @ GroupError::CapacityExceeded { .. } => AppError::Conflict(e.to_string()),
            GroupError::AlreadyGrouped(message) => AppError::Conflict(message),
            GroupError::Store(source) => {
                error!("Store error reached the API boundary: {:?}", source);
                AppError::InternalServerError(anyhow::Error::new(source).context("Store error"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),

            AppError::InternalServerError(source) => {
                error!(
                    "Responding with 500 Internal Server Error. Source: {:?}",
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        ApiResponse::failure(status, error_message).into_response()
    }
}
