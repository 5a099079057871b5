use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use voxline_db::DbError;
use voxline_store::StoreError;
use voxline_types::api::ErrorBody;

/// Errors surfaced by the services, mapped onto HTTP statuses at the edge.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// A sender or receiver id that does not exist. Reported as a client error.
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("invalid username or password")]
    Unauthorized,

    #[error("upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("storage error: {0}")]
    StorageIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UserNotFound(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::StorageIo(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(what) => AppError::Duplicate(what),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => AppError::NotFound(format!("audio file {} not found", key)),
            StoreError::InvalidKey(key) => AppError::Validation(format!("invalid storage key {:?}", key)),
            other => AppError::StorageIo(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }

        // Internal details stay in the log
        let message = match &self {
            AppError::StorageIo(_) => "storage failure".to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::UserNotFound(3).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Duplicate("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::StorageIo("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_errors_translate() {
        let err: AppError = StoreError::Write {
            key: "k".into(),
            source: io::Error::other("disk full"),
        }
        .into();
        assert!(matches!(err, AppError::StorageIo(_)));

        let err: AppError = StoreError::Collision("k".into()).into();
        assert!(matches!(err, AppError::StorageIo(_)));

        let err: AppError = StoreError::NotFound("k".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn duplicate_db_error_stays_duplicate() {
        let err: AppError = DbError::Duplicate("username 'a' is taken".into()).into();
        assert!(matches!(err, AppError::Duplicate(ref m) if m.contains("taken")));
    }

    #[tokio::test]
    async fn server_errors_hide_details() {
        use http_body_util::BodyExt;

        let response = AppError::StorageIo("/srv/audio: permission denied".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "storage failure");
    }

    #[tokio::test]
    async fn client_errors_carry_their_message() {
        use http_body_util::BodyExt;

        let response = AppError::UserNotFound(12).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "user 12 not found");
    }
}
