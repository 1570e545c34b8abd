//! Callbacks from the generation worker.
//!
//! These routes sit behind the internal network and carry no player header.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storyloop_core::command::Command;
use storyloop_gameplay::application::generation_results::{self, SceneDelivery};
use storyloop_gameplay::domain::commands;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// Request body for POST /scene-ready.
#[derive(Debug, Deserialize)]
pub struct SceneReadyRequest {
    pub story_id: Uuid,
    pub state_hash: String,
    pub content: Value,
}

/// Response body for POST /scene-ready.
#[derive(Debug, Serialize)]
pub struct SceneReadyResponse {
    pub scene_id: Uuid,
    pub advanced_game_state_ids: Vec<Uuid>,
}

impl From<SceneDelivery> for SceneReadyResponse {
    fn from(delivery: SceneDelivery) -> Self {
        Self {
            scene_id: delivery.scene_id,
            advanced_game_state_ids: delivery.advanced_game_state_ids,
        }
    }
}

/// Request body for POST /failed.
#[derive(Debug, Deserialize)]
pub struct GenerationFailedRequest {
    pub game_state_id: Uuid,
    pub detail: String,
}

/// Response body for POST /failed.
#[derive(Debug, Serialize)]
pub struct GenerationFailedResponse {
    /// False when the save slot was no longer waiting.
    pub recorded: bool,
}

/// POST /scene-ready
#[instrument(skip_all, fields(story_id = %request.story_id))]
async fn scene_ready(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SceneReadyRequest>,
) -> Result<Json<SceneReadyResponse>, ApiError> {
    let command = commands::RecordGeneratedScene {
        correlation_id: Uuid::new_v4(),
        story_id: request.story_id,
        state_hash: request.state_hash,
        content: request.content,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    let delivery = generation_results::handle_record_generated_scene(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        state.store.as_ref(),
    )
    .await?;

    Ok(Json(delivery.into()))
}

/// POST /failed
#[instrument(skip_all, fields(game_state_id = %request.game_state_id))]
async fn generation_failed(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenerationFailedRequest>,
) -> Result<Json<GenerationFailedResponse>, ApiError> {
    let command = commands::RecordGenerationFailure {
        correlation_id: Uuid::new_v4(),
        game_state_id: request.game_state_id,
        detail: request.detail,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    let recorded = generation_results::handle_record_generation_failure(
        &command,
        state.clock.as_ref(),
        state.store.as_ref(),
    )
    .await?;

    Ok(Json(GenerationFailedResponse { recorded }))
}

/// Returns the router for worker callbacks.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scene-ready", post(scene_ready))
        .route("/failed", post(generation_failed))
}
