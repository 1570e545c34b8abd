//! Request extractors.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};

/// Header carrying the authenticated player's id, set by the gateway.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// A JSON request body. Malformed or mistyped bodies are rejected with the
/// usual `validation_error` envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// The calling player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerId(pub Uuid);

/// Rejection for a missing or malformed player header.
#[derive(Debug)]
pub struct MissingPlayer;

impl IntoResponse for MissingPlayer {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: "unauthenticated",
            message: format!("{PLAYER_ID_HEADER} header with a player id is required"),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl<S> FromRequestParts<S> for PlayerId
where
    S: Send + Sync,
{
    type Rejection = MissingPlayer;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PLAYER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(PlayerId)
            .ok_or(MissingPlayer)
    }
}
