//! Error responses for the HTTP gateway
//!
//! Every failure goes back to the client in the common message envelope with
//! `message_type = "error"`, so clients handle success and failure the same
//! way.

use crate::clip::ClipError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use segck_common::protocol::Message;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Store, lock or validation error
    #[error(transparent)]
    Common(#[from] segck_common::Error),

    /// Audio could not be clipped
    #[error("failed to clip audio: {0}")]
    Clip(#[from] ClipError),

    /// Blocking task failed to complete
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use segck_common::Error;
        match self {
            ApiError::Common(e) => match e {
                Error::AlreadyLocked { .. } | Error::NotLocked(_) | Error::NotOwner { .. } => {
                    StatusCode::CONFLICT
                }
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::InvalidIndex(_) | Error::InvalidStatusFilter(_) | Error::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Clip(ClipError::Fetch { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Clip(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(Message::error(self.to_string()))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use segck_common::Error;

    #[test]
    fn test_status_mapping() {
        let locked = ApiError::from(Error::AlreadyLocked {
            id: "a".to_string(),
            by: "u1".to_string(),
        });
        assert_eq!(locked.status(), StatusCode::CONFLICT);
        assert_eq!(locked.to_string(), "a is already locked by user u1");

        assert_eq!(
            ApiError::from(Error::NotFound("a".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(Error::InvalidStatusFilter(" ok".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::Internal("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ClipError::Fetch {
                url: "http://x/a.wav".to_string(),
                reason: "refused".to_string(),
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_client_errors_agree_with_common_classification() {
        let errors = [
            Error::NotLocked("a".to_string()),
            Error::InvalidIndex("x".to_string()),
            Error::Config("bad".to_string()),
        ];
        for e in errors {
            let client = e.is_client_error();
            assert_eq!(ApiError::from(e).status().is_client_error(), client);
        }
    }
}
