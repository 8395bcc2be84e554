use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;

use super::model::EntityKind;

pub type OkrResult<T> = Result<T, OkrError>;

#[derive(Debug, thiserror::Error)]
pub enum OkrError {
    #[error("No {kind} with id {id} exists")]
    NotFound { kind: EntityKind, id: i64 },
    #[error("Goal value must be greater than 0, got {0}")]
    InvalidGoal(f64),
    #[error("BusinessUnitKeyResult {key_result} would reference more than one CompanyKeyResult")]
    ReferenceConflict { key_result: i64 },
    #[error("Consistency violation: {0}")]
    Consistency(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl OkrError {
    pub fn not_found(kind: EntityKind, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidGoal(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ReferenceConflict { .. } => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Consistency(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for OkrError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for OkrError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for OkrError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Storage(format!("blocking task failed: {e}"))
    }
}

impl IntoResponse for OkrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_entity_kind() {
        let err = OkrError::not_found(EntityKind::CompanyKeyResult, 9);
        assert_eq!(err.to_string(), "No CompanyKeyResult with id 9 exists");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OkrError::InvalidGoal(0.0).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OkrError::ReferenceConflict { key_result: 1 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            OkrError::Unauthorized("missing token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OkrError::Consistency("lost row".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
