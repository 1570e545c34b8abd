//! API error types.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use storyloop_core::error::DomainError;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

/// A body that failed to parse is a validation failure like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DomainError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::GameStateNotFound(_) => (StatusCode::NOT_FOUND, "game_state_not_found"),
            DomainError::StoryNotFound(_) => (StatusCode::NOT_FOUND, "story_not_found"),
            DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            DomainError::NeedsGeneration(_) => (StatusCode::CONFLICT, "needs_generation"),
            DomainError::EndingPending(_) => (StatusCode::CONFLICT, "ending_pending"),
            DomainError::StateInError { .. } => (StatusCode::CONFLICT, "game_state_in_error"),
            DomainError::InvalidOperation(_) => (StatusCode::CONFLICT, "invalid_operation"),
            DomainError::StoryNotPlayable(_) => (StatusCode::CONFLICT, "story_not_playable"),
            DomainError::SaveSlotLimitReached { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "save_slot_limit_reached")
            }
            DomainError::GenerationLimitReached { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "generation_limit_reached")
            }
            DomainError::Dispatch(_) => (StatusCode::SERVICE_UNAVAILABLE, "dispatch_error"),
            DomainError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Storage details and fingerprints stay in the logs.
        let message = if self.0.is_expected() {
            self.0.to_string()
        } else if matches!(self.0, DomainError::Dispatch(_)) {
            "story generation is temporarily unavailable, please try again".to_owned()
        } else {
            "an internal error occurred".to_owned()
        };

        let body = ErrorBody {
            error: error_code,
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(DomainError::GameStateNotFound(id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(DomainError::StoryNotFound(id)), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        assert_eq!(
            status_of(DomainError::Forbidden(Uuid::new_v4())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_status_preconditions_map_to_409() {
        let id = Uuid::new_v4();
        for err in [
            DomainError::NeedsGeneration(id),
            DomainError::EndingPending(id),
            DomainError::StoryNotPlayable(id),
            DomainError::InvalidOperation("completed".into()),
            DomainError::StateInError {
                game_state_id: id,
                detail: None,
            },
        ] {
            assert_eq!(status_of(err), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn test_limits_map_to_429() {
        assert_eq!(
            status_of(DomainError::GenerationLimitReached {
                active: 1,
                limit: 1,
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(DomainError::SaveSlotLimitReached { limit: 3 }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("bad input".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_dispatch_maps_to_503() {
        assert_eq!(
            status_of(DomainError::Dispatch("broker unavailable".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_infrastructure_maps_to_500_without_leaking_detail() {
        let response =
            ApiError(DomainError::Infrastructure("relation \"x\" does not exist".into()))
                .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "infrastructure_error");
        assert_eq!(json["message"], "an internal error occurred");
    }
}
