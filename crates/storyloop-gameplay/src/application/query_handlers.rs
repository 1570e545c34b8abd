//! Query handlers for the game loop.
//!
//! Reads never block on generation: a save slot waiting for content answers
//! with a distinguishable "not ready" view instead. A waiting slot whose
//! scene was delivered before its own transaction committed is moved onto
//! that scene by the read that finds it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use storyloop_core::env::Clock;
use storyloop_core::error::DomainError;
use storyloop_core::game_state::{GameStatus, PlayerGameState};
use storyloop_core::store::{GameStore, GameUnitOfWork};
use tracing::{Span, field, info, instrument};
use uuid::Uuid;

use crate::domain::scene_content::SceneContent;

use super::command_handlers::load_progress;
use super::unit_of_work::{abandon, log_failure};

/// What the player should see for a save slot right now.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentSceneView {
    /// A scene with choices is ready.
    Ready {
        game_state_id: Uuid,
        scene_id: Uuid,
        content: SceneContent,
    },
    /// The game is over; the scene is the ending.
    Finished {
        game_state_id: Uuid,
        scene_id: Uuid,
        content: SceneContent,
    },
    /// The next scene is still being generated.
    NeedsGeneration { game_state_id: Uuid },
    /// The ending is still being generated.
    EndingPending { game_state_id: Uuid },
    /// Generation failed; a retry is needed.
    Failed {
        game_state_id: Uuid,
        detail: Option<String>,
    },
}

/// A save slot's accumulated narrative state, without its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    pub scene_index: i32,
    pub core_stats: BTreeMap<String, i64>,
    pub story_variables: BTreeMap<String, Value>,
    pub global_flags: BTreeSet<String>,
    pub encountered_characters: Vec<String>,
    pub last_story_summary: Option<String>,
    pub last_activity_at: DateTime<Utc>,
}

/// Returns the current scene of a save slot, or why there is none.
///
/// # Errors
///
/// Returns `DomainError::GameStateNotFound`, `DomainError::Forbidden`, or
/// `DomainError::Internal` if a playing save slot points at a missing or
/// malformed scene.
#[instrument(
    skip_all,
    fields(
        player_id = %player_id,
        game_state_id = %game_state_id,
        story_id = field::Empty,
        state_hash = field::Empty,
    )
)]
pub async fn get_current_scene(
    player_id: Uuid,
    game_state_id: Uuid,
    clock: &dyn Clock,
    store: &dyn GameStore,
) -> Result<CurrentSceneView, DomainError> {
    let mut uow = store.begin().await?;
    let result = current_scene(&mut *uow, player_id, game_state_id, clock).await;
    finish_read(uow, result).await
}

async fn current_scene(
    uow: &mut dyn GameUnitOfWork,
    player_id: Uuid,
    game_state_id: Uuid,
    clock: &dyn Clock,
) -> Result<(CurrentSceneView, bool), DomainError> {
    let (state, caught_up) = settled_game_state(uow, player_id, game_state_id, clock).await?;
    let view = match state.status {
        GameStatus::Playing => {
            let (scene_id, content) = current_scene_of(uow, &state).await?;
            CurrentSceneView::Ready {
                game_state_id,
                scene_id,
                content,
            }
        }
        GameStatus::Completed => {
            let (scene_id, content) = current_scene_of(uow, &state).await?;
            CurrentSceneView::Finished {
                game_state_id,
                scene_id,
                content,
            }
        }
        GameStatus::GeneratingScene => CurrentSceneView::NeedsGeneration { game_state_id },
        GameStatus::GameOverPending => CurrentSceneView::EndingPending { game_state_id },
        GameStatus::Error => CurrentSceneView::Failed {
            game_state_id,
            detail: state.error_details,
        },
    };
    Ok((view, caught_up))
}

/// Returns a save slot's progress.
///
/// # Errors
///
/// Returns `DomainError::GameStateNotFound`, `DomainError::Forbidden`, or
/// `DomainError::Internal` if the progress node is missing.
#[instrument(
    skip_all,
    fields(
        player_id = %player_id,
        game_state_id = %game_state_id,
        story_id = field::Empty,
        state_hash = field::Empty,
    )
)]
pub async fn get_progress(
    player_id: Uuid,
    game_state_id: Uuid,
    clock: &dyn Clock,
    store: &dyn GameStore,
) -> Result<ProgressView, DomainError> {
    let mut uow = store.begin().await?;
    let result = progress(&mut *uow, player_id, game_state_id, clock).await;
    finish_read(uow, result).await
}

async fn progress(
    uow: &mut dyn GameUnitOfWork,
    player_id: Uuid,
    game_state_id: Uuid,
    clock: &dyn Clock,
) -> Result<(ProgressView, bool), DomainError> {
    let (state, caught_up) = settled_game_state(uow, player_id, game_state_id, clock).await?;
    let node = load_progress(uow, &state).await?;
    Span::current().record("state_hash", node.state_hash.as_str());
    let view = ProgressView {
        game_state_id,
        status: state.status,
        scene_index: node.scene_index,
        core_stats: node.core_stats,
        story_variables: node.story_variables,
        global_flags: node.global_flags,
        encountered_characters: node.encountered_characters,
        last_story_summary: node.last_story_summary,
        last_activity_at: state.last_activity_at,
    };
    Ok((view, caught_up))
}

/// Lists a player's save slots on a story, most recent activity first.
///
/// # Errors
///
/// Returns `DomainError` if the store fails.
#[instrument(skip_all, fields(player_id = %player_id, story_id = %story_id))]
pub async fn list_game_states(
    player_id: Uuid,
    story_id: Uuid,
    store: &dyn GameStore,
) -> Result<Vec<PlayerGameState>, DomainError> {
    let mut uow = store.begin().await?;
    let result = uow
        .list_game_states(player_id, story_id)
        .await
        .map(|states| (states, false));
    finish_read(uow, result).await
}

/// Commits when the read moved a waiting save slot, otherwise rolls back.
async fn finish_read<T>(
    uow: Box<dyn GameUnitOfWork>,
    result: Result<(T, bool), DomainError>,
) -> Result<T, DomainError> {
    match result {
        Ok((value, true)) => match uow.commit().await {
            Ok(()) => Ok(value),
            Err(err) => {
                log_failure(&err);
                Err(err)
            }
        },
        Ok((value, false)) => {
            abandon(uow).await;
            Ok(value)
        }
        Err(err) => {
            abandon(uow).await;
            log_failure(&err);
            Err(err)
        }
    }
}

/// Loads an owned save slot; if it is waiting and its content has already
/// been stored, moves it onto that content. Returns whether it moved.
async fn settled_game_state(
    uow: &mut dyn GameUnitOfWork,
    player_id: Uuid,
    game_state_id: Uuid,
    clock: &dyn Clock,
) -> Result<(PlayerGameState, bool), DomainError> {
    let state = owned_game_state(uow, player_id, game_state_id).await?;
    Span::current().record("story_id", field::display(state.story_id));
    if !state.status.awaits_generation() {
        return Ok((state, false));
    }

    let mut state = uow
        .lock_game_state(game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(game_state_id))?;
    let caught_up = catch_up(uow, &mut state, clock).await?;
    Ok((state, caught_up))
}

async fn catch_up(
    uow: &mut dyn GameUnitOfWork,
    state: &mut PlayerGameState,
    clock: &dyn Clock,
) -> Result<bool, DomainError> {
    if !state.status.awaits_generation() {
        return Ok(false);
    }
    let node = load_progress(uow, state).await?;
    Span::current().record("state_hash", node.state_hash.as_str());
    let Some(scene) = uow.find_scene(state.story_id, &node.state_hash).await? else {
        return Ok(false);
    };

    let now = clock.now();
    if state.status == GameStatus::GameOverPending {
        state.complete(scene.id, node.id, now)?;
    } else {
        state.advance_to_scene(scene.id, node.id, now)?;
    }
    uow.save_game_state(state).await?;
    info!(scene_id = %scene.id, status = %state.status, "waiting save slot caught up");
    Ok(true)
}

async fn owned_game_state(
    uow: &mut dyn GameUnitOfWork,
    player_id: Uuid,
    game_state_id: Uuid,
) -> Result<PlayerGameState, DomainError> {
    let state = uow
        .load_game_state(game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(game_state_id))?;
    state.ensure_owned_by(player_id)?;
    Ok(state)
}

async fn current_scene_of(
    uow: &mut dyn GameUnitOfWork,
    state: &PlayerGameState,
) -> Result<(Uuid, SceneContent), DomainError> {
    let scene_id = state.current_scene_id.ok_or_else(|| {
        DomainError::Internal(format!(
            "game state {} is {} without a scene",
            state.id, state.status
        ))
    })?;
    let scene = uow
        .load_scene(scene_id)
        .await?
        .ok_or_else(|| DomainError::Internal(format!("scene {scene_id} is missing")))?;
    Span::current().record("state_hash", scene.state_hash.as_str());
    Ok((scene_id, SceneContent::parse(&scene.content)?))
}
