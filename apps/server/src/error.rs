use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use quizsync_core::{Error as CoreError, StorageError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    /// Device offline or local store closed.
    ServiceUnavailable(String),
    InsufficientStorage(String),
    /// The remote API failed a user-initiated call.
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "auth_required",
            ApiError::NotFound(_) => "not_found",
            ApiError::ServiceUnavailable(_) => "unavailable",
            ApiError::InsufficientStorage(_) => "quota_exceeded",
            ApiError::BadGateway(_) => "remote_error",
            ApiError::Internal(_) => "internal",
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::ServiceUnavailable(message)
            | ApiError::InsufficientStorage(message)
            | ApiError::BadGateway(message)
            | ApiError::Internal(message) => message,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Storage(StorageError::QuotaExceeded(_)) => {
                ApiError::InsufficientStorage(message)
            }
            CoreError::Storage(StorageError::Unavailable(_)) | CoreError::Offline => {
                ApiError::ServiceUnavailable(message)
            }
            CoreError::Storage(_) => ApiError::Internal(message),
            CoreError::AuthRequired(_) => ApiError::Unauthorized(message),
            CoreError::Transport(_) => ApiError::BadGateway(message),
            CoreError::Serialization(_)
            | CoreError::InvalidSnapshot(_)
            | CoreError::InvalidRequest(_) => ApiError::BadRequest(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed ({}): {}", status, self.message());
        }
        let body = Json(json!({
            "code": self.code(),
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}
