//! Player-facing routes: save slots, scenes, choices and progress.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storyloop_core::command::Command;
use storyloop_core::game_state::{GameStatus, PlayerGameState};
use storyloop_core::story::Termination;
use storyloop_gameplay::application::command_handlers::{self, GameOutcome};
use storyloop_gameplay::application::query_handlers::{self, CurrentSceneView, ProgressView};
use storyloop_gameplay::domain::commands;
use storyloop_gameplay::domain::scene_content::SceneContent;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{JsonBody, PlayerId};
use crate::state::AppState;

/// Request body for POST /game-states/{id}/choices.
#[derive(Debug, Deserialize)]
pub struct MakeChoiceRequest {
    /// One option index per answered choice block, in block order.
    pub selected_option_indices: Vec<usize>,
}

/// Response body for commands that move a save slot.
#[derive(Debug, Serialize)]
pub struct GameOutcomeResponse {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_scene_id: Option<Uuid>,
    /// Whether new content was requested from the generation worker.
    pub generation_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
}

impl From<GameOutcome> for GameOutcomeResponse {
    fn from(outcome: GameOutcome) -> Self {
        Self {
            game_state_id: outcome.game_state_id,
            status: outcome.status,
            current_scene_id: outcome.current_scene_id,
            generation_requested: outcome.dispatched_task_id.is_some(),
            termination: outcome.termination,
        }
    }
}

/// A choice block as shown to the player, without its consequences.
#[derive(Debug, Serialize)]
pub struct ChoiceBody {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    pub required: bool,
    pub options: Vec<String>,
}

/// A scene as shown to the player.
#[derive(Debug, Serialize)]
pub struct SceneBody {
    pub scene_id: Uuid,
    pub choices: Vec<ChoiceBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ending_text: Option<String>,
}

impl SceneBody {
    fn render(scene_id: Uuid, content: SceneContent) -> Self {
        Self {
            scene_id,
            choices: content
                .choices
                .into_iter()
                .map(|block| ChoiceBody {
                    description: block.description,
                    character: block.character,
                    required: block.required,
                    options: block.options.into_iter().map(|o| o.text).collect(),
                })
                .collect(),
            story_summary: content.story_summary_so_far,
            ending_text: content.ending_text,
        }
    }
}

/// Response body for GET /game-states/{id}/scene.
#[derive(Debug, Serialize)]
pub struct SceneResponse {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Response body for GET /game-states/{id}/progress.
#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    pub scene_index: i32,
    pub core_stats: BTreeMap<String, i64>,
    pub story_variables: BTreeMap<String, Value>,
    pub global_flags: BTreeSet<String>,
    pub encountered_characters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_summary: Option<String>,
    pub last_activity_at: DateTime<Utc>,
}

impl From<ProgressView> for ProgressResponse {
    fn from(view: ProgressView) -> Self {
        Self {
            game_state_id: view.game_state_id,
            status: view.status,
            scene_index: view.scene_index,
            core_stats: view.core_stats,
            story_variables: view.story_variables,
            global_flags: view.global_flags,
            encountered_characters: view.encountered_characters,
            story_summary: view.last_story_summary,
            last_activity_at: view.last_activity_at,
        }
    }
}

/// One entry of GET /stories/{story_id}/game-states.
#[derive(Debug, Serialize)]
pub struct GameStateSummary {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PlayerGameState> for GameStateSummary {
    fn from(state: PlayerGameState) -> Self {
        Self {
            game_state_id: state.id,
            status: state.status,
            started_at: state.started_at,
            last_activity_at: state.last_activity_at,
            completed_at: state.completed_at,
        }
    }
}

/// POST /stories/{story_id}/game-states
#[instrument(skip_all, fields(player_id = %player.0, story_id = %story_id))]
async fn start_game(
    State(state): State<AppState>,
    player: PlayerId,
    Path(story_id): Path<Uuid>,
) -> Result<(StatusCode, Json<GameOutcomeResponse>), ApiError> {
    let command = commands::StartGame {
        correlation_id: Uuid::new_v4(),
        player_id: player.0,
        story_id,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    let outcome = command_handlers::handle_start_game(
        &command,
        &state.settings,
        state.clock.as_ref(),
        state.ids.as_ref(),
        state.store.as_ref(),
        state.dispatcher.as_ref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// GET /stories/{story_id}/game-states
#[instrument(skip_all, fields(player_id = %player.0, story_id = %story_id))]
async fn list_game_states(
    State(state): State<AppState>,
    player: PlayerId,
    Path(story_id): Path<Uuid>,
) -> Result<Json<Vec<GameStateSummary>>, ApiError> {
    let states = query_handlers::list_game_states(player.0, story_id, state.store.as_ref()).await?;

    Ok(Json(states.into_iter().map(Into::into).collect()))
}

/// GET /game-states/{game_state_id}/scene
#[instrument(skip_all, fields(player_id = %player.0, game_state_id = %game_state_id))]
async fn get_scene(
    State(state): State<AppState>,
    player: PlayerId,
    Path(game_state_id): Path<Uuid>,
) -> Result<(StatusCode, Json<SceneResponse>), ApiError> {
    let view = query_handlers::get_current_scene(
        player.0,
        game_state_id,
        state.clock.as_ref(),
        state.store.as_ref(),
    )
    .await?;

    let (code, status, scene, error_detail) = match view {
        CurrentSceneView::Ready {
            scene_id, content, ..
        } => (
            StatusCode::OK,
            GameStatus::Playing,
            Some(SceneBody::render(scene_id, content)),
            None,
        ),
        CurrentSceneView::Finished {
            scene_id, content, ..
        } => (
            StatusCode::OK,
            GameStatus::Completed,
            Some(SceneBody::render(scene_id, content)),
            None,
        ),
        CurrentSceneView::NeedsGeneration { .. } => {
            (StatusCode::ACCEPTED, GameStatus::GeneratingScene, None, None)
        }
        CurrentSceneView::EndingPending { .. } => {
            (StatusCode::ACCEPTED, GameStatus::GameOverPending, None, None)
        }
        CurrentSceneView::Failed { detail, .. } => {
            (StatusCode::CONFLICT, GameStatus::Error, None, detail)
        }
    };

    Ok((
        code,
        Json(SceneResponse {
            game_state_id,
            status,
            scene,
            error_detail,
        }),
    ))
}

/// POST /game-states/{game_state_id}/choices
#[instrument(skip_all, fields(player_id = %player.0, game_state_id = %game_state_id))]
async fn make_choice(
    State(state): State<AppState>,
    player: PlayerId,
    Path(game_state_id): Path<Uuid>,
    JsonBody(request): JsonBody<MakeChoiceRequest>,
) -> Result<Json<GameOutcomeResponse>, ApiError> {
    let command = commands::MakeChoice {
        correlation_id: Uuid::new_v4(),
        player_id: player.0,
        game_state_id,
        selected_option_indices: request.selected_option_indices,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    let outcome = command_handlers::handle_make_choice(
        &command,
        state.clock.as_ref(),
        state.ids.as_ref(),
        state.store.as_ref(),
        state.dispatcher.as_ref(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// GET /game-states/{game_state_id}/progress
#[instrument(skip_all, fields(player_id = %player.0, game_state_id = %game_state_id))]
async fn get_progress(
    State(state): State<AppState>,
    player: PlayerId,
    Path(game_state_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let view = query_handlers::get_progress(
        player.0,
        game_state_id,
        state.clock.as_ref(),
        state.store.as_ref(),
    )
    .await?;

    Ok(Json(view.into()))
}

/// POST /game-states/{game_state_id}/retry
#[instrument(skip_all, fields(player_id = %player.0, game_state_id = %game_state_id))]
async fn retry_generation(
    State(state): State<AppState>,
    player: PlayerId,
    Path(game_state_id): Path<Uuid>,
) -> Result<Json<GameOutcomeResponse>, ApiError> {
    let command = commands::RetryGeneration {
        correlation_id: Uuid::new_v4(),
        player_id: player.0,
        game_state_id,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    let outcome = command_handlers::handle_retry_generation(
        &command,
        &state.settings,
        state.clock.as_ref(),
        state.ids.as_ref(),
        state.store.as_ref(),
        state.dispatcher.as_ref(),
    )
    .await?;

    Ok(Json(outcome.into()))
}

/// DELETE /game-states/{game_state_id}
#[instrument(skip_all, fields(player_id = %player.0, game_state_id = %game_state_id))]
async fn delete_game_state(
    State(state): State<AppState>,
    player: PlayerId,
    Path(game_state_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let command = commands::DeleteGameState {
        correlation_id: Uuid::new_v4(),
        player_id: player.0,
        game_state_id,
    };

    info!(
        correlation_id = %command.correlation_id,
        command_type = command.command_type(),
        "handling command"
    );

    command_handlers::handle_delete_game_state(&command, state.store.as_ref()).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for player-facing game routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/stories/{story_id}/game-states",
            post(start_game).get(list_game_states),
        )
        .route("/game-states/{game_state_id}", delete(delete_game_state))
        .route("/game-states/{game_state_id}/scene", get(get_scene))
        .route("/game-states/{game_state_id}/choices", post(make_choice))
        .route("/game-states/{game_state_id}/progress", get(get_progress))
        .route("/game-states/{game_state_id}/retry", post(retry_generation))
}
