//! Per-player routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use storyloop_gameplay::application::admission::{self, Admission};
use tracing::instrument;

use crate::error::ApiError;
use crate::extract::PlayerId;
use crate::state::AppState;

/// Response body for GET /me/generation-admission.
#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    pub active: usize,
    pub limit: usize,
}

impl From<Admission> for AdmissionResponse {
    fn from(admission: Admission) -> Self {
        Self {
            active: admission.active,
            limit: admission.limit,
        }
    }
}

/// GET /me/generation-admission
///
/// 200 while the player has headroom, 429 once the limit is reached.
#[instrument(skip_all, fields(player_id = %player.0))]
async fn generation_admission(
    State(state): State<AppState>,
    player: PlayerId,
) -> Result<Json<AdmissionResponse>, ApiError> {
    let admission =
        admission::check_generation_admission(player.0, &state.settings, state.store.as_ref())
            .await?;

    Ok(Json(admission.into()))
}

/// Returns the router for per-player routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/me/generation-admission", get(generation_admission))
}
