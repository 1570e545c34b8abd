//! Intake of generation results reported by the worker.

use storyloop_core::env::{Clock, IdSource};
use storyloop_core::error::DomainError;
use storyloop_core::game_state::GameStatus;
use storyloop_core::scene::StoryScene;
use storyloop_core::store::{GameStore, GameUnitOfWork};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::commands::{RecordGeneratedScene, RecordGenerationFailure};
use crate::domain::scene_content::SceneContent;

use super::unit_of_work::{abandon, log_failure};

/// Result of recording a generated scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDelivery {
    /// The scene stored for the fingerprint (possibly an earlier one).
    pub scene_id: Uuid,
    /// Save slots moved onto the scene.
    pub advanced_game_state_ids: Vec<Uuid>,
}

/// Handles the `RecordGeneratedScene` command: stores the scene for its
/// fingerprint (keeping the first one if several tasks raced) and moves
/// every save slot parked on that fingerprint onto it.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an empty fingerprint or content
/// that is not a scene document, `DomainError::StoryNotFound`, or
/// `DomainError` if the store fails.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        story_id = %command.story_id,
        state_hash = %command.state_hash,
    )
)]
pub async fn handle_record_generated_scene(
    command: &RecordGeneratedScene,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    store: &dyn GameStore,
) -> Result<SceneDelivery, DomainError> {
    if command.state_hash.trim().is_empty() {
        return Err(DomainError::Validation("state_hash cannot be empty".into()));
    }
    SceneContent::parse(&command.content)
        .map_err(|e| DomainError::Validation(format!("content is not a scene document: {e}")))?;

    let mut uow = store.begin().await?;
    match record_scene(&mut *uow, command, clock, ids).await {
        Ok(delivery) => {
            uow.commit().await?;
            info!(
                scene_id = %delivery.scene_id,
                advanced = delivery.advanced_game_state_ids.len(),
                "generated scene recorded"
            );
            Ok(delivery)
        }
        Err(err) => {
            abandon(uow).await;
            log_failure(&err);
            Err(err)
        }
    }
}

async fn record_scene(
    uow: &mut dyn GameUnitOfWork,
    command: &RecordGeneratedScene,
    clock: &dyn Clock,
    ids: &dyn IdSource,
) -> Result<SceneDelivery, DomainError> {
    let now = clock.now();
    uow.load_story(command.story_id)
        .await?
        .ok_or(DomainError::StoryNotFound(command.story_id))?;

    let scene_id = uow
        .insert_scene_if_absent(&StoryScene {
            id: ids.next_id(),
            story_id: command.story_id,
            state_hash: command.state_hash.clone(),
            content: command.content.clone(),
            created_at: now,
        })
        .await?;

    let Some(progress) = uow
        .find_progress(command.story_id, &command.state_hash)
        .await?
    else {
        warn!("no progress node for delivered scene");
        return Ok(SceneDelivery {
            scene_id,
            advanced_game_state_ids: Vec::new(),
        });
    };

    let mut advanced = Vec::new();
    for mut state in uow.list_pending_for_progress(progress.id).await? {
        match state.status {
            GameStatus::GeneratingScene => state.advance_to_scene(scene_id, progress.id, now)?,
            GameStatus::GameOverPending => state.complete(scene_id, progress.id, now)?,
            _ => continue,
        }
        uow.save_game_state(&state).await?;
        advanced.push(state.id);
    }

    Ok(SceneDelivery {
        scene_id,
        advanced_game_state_ids: advanced,
    })
}

/// Handles the `RecordGenerationFailure` command. Returns whether the
/// failure was recorded; a report against a save slot that is no longer
/// waiting is stale and ignored.
///
/// # Errors
///
/// Returns `DomainError::GameStateNotFound`, or `DomainError` if the store
/// fails.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        game_state_id = %command.game_state_id,
    )
)]
pub async fn handle_record_generation_failure(
    command: &RecordGenerationFailure,
    clock: &dyn Clock,
    store: &dyn GameStore,
) -> Result<bool, DomainError> {
    let mut uow = store.begin().await?;
    match record_failure(&mut *uow, command, clock).await {
        Ok(true) => {
            uow.commit().await?;
            info!("generation failure recorded");
            Ok(true)
        }
        Ok(false) => {
            abandon(uow).await;
            Ok(false)
        }
        Err(err) => {
            abandon(uow).await;
            log_failure(&err);
            Err(err)
        }
    }
}

async fn record_failure(
    uow: &mut dyn GameUnitOfWork,
    command: &RecordGenerationFailure,
    clock: &dyn Clock,
) -> Result<bool, DomainError> {
    let mut state = uow
        .lock_game_state(command.game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(command.game_state_id))?;
    if !state.status.awaits_generation() {
        info!(status = %state.status, "ignoring stale generation failure");
        return Ok(false);
    }
    state.fail(command.detail.clone(), clock.now())?;
    uow.save_game_state(&state).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storyloop_core::game_state::PlayerGameState;
    use storyloop_test_support::{FixedClock, SequentialIds};
    use uuid::Uuid;

    use super::*;
    use crate::application::fixtures::{Seeded, now, tension_scene};

    /// Parks `state` on the node at `state_hash`, creating it if needed.
    fn park(
        seeded: &Seeded,
        mut state: PlayerGameState,
        state_hash: &str,
        ending: bool,
    ) -> PlayerGameState {
        let node = seeded
            .store
            .progress_nodes()
            .into_iter()
            .find(|p| p.state_hash == state_hash)
            .unwrap_or_else(|| {
                let mut node = seeded.progress.next_candidate(Uuid::new_v4(), now());
                node.state_hash = state_hash.to_owned();
                seeded.store.put_progress(node.clone());
                node
            });
        if ending {
            state.await_ending(node.id, now()).unwrap();
        } else {
            state.await_scene(node.id, now()).unwrap();
        }
        seeded.store.put_game_state(state.clone());
        state
    }

    fn delivery(
        seeded: &Seeded,
        state_hash: &str,
        content: serde_json::Value,
    ) -> RecordGeneratedScene {
        RecordGeneratedScene {
            correlation_id: Uuid::new_v4(),
            story_id: seeded.story.id,
            state_hash: state_hash.to_owned(),
            content,
        }
    }

    #[tokio::test]
    async fn test_delivered_scene_advances_every_waiting_slot() {
        // Arrange
        let seeded = Seeded::playing(tension_scene(&[3]));
        let first = park(&seeded, seeded.game_state.clone(), "abc", false);
        let second = park(&seeded, seeded.add_player(), "abc", false);
        let bystander = seeded.add_player();

        // Act
        let delivered = handle_record_generated_scene(
            &delivery(&seeded, "abc", tension_scene(&[1])),
            &FixedClock(now()),
            &SequentialIds::new(),
            &seeded.store,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(delivered.advanced_game_state_ids.len(), 2);
        for id in [first.id, second.id] {
            let state = seeded.store.game_state(id).unwrap();
            assert_eq!(state.status, GameStatus::Playing);
            assert_eq!(state.current_scene_id, Some(delivered.scene_id));
        }
        assert_eq!(seeded.store.game_state(bystander.id), Some(bystander));
        assert_eq!(seeded.store.scenes().len(), 2);
    }

    #[tokio::test]
    async fn test_second_delivery_for_fingerprint_keeps_first_scene() {
        // Arrange
        let seeded = Seeded::playing(tension_scene(&[3]));
        park(&seeded, seeded.game_state.clone(), "abc", false);
        let ids = SequentialIds::new();
        let clock = FixedClock(now());

        // Act
        let first = handle_record_generated_scene(
            &delivery(&seeded, "abc", tension_scene(&[1])),
            &clock,
            &ids,
            &seeded.store,
        )
        .await
        .unwrap();
        let second = handle_record_generated_scene(
            &delivery(&seeded, "abc", tension_scene(&[2])),
            &clock,
            &ids,
            &seeded.store,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(first.scene_id, second.scene_id);
        assert!(second.advanced_game_state_ids.is_empty());
        let stored: Vec<_> = seeded
            .store
            .scenes()
            .into_iter()
            .filter(|s| s.state_hash == "abc")
            .collect();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, tension_scene(&[1]));
    }

    #[tokio::test]
    async fn test_delivered_ending_completes_pending_slot() {
        // Arrange
        let seeded = Seeded::playing(tension_scene(&[15]));
        let state = park(&seeded, seeded.game_state.clone(), "final", true);

        // Act
        let delivered = handle_record_generated_scene(
            &delivery(&seeded, "final", json!({"et": "The lamp goes dark."})),
            &FixedClock(now()),
            &SequentialIds::new(),
            &seeded.store,
        )
        .await
        .unwrap();

        // Assert
        let stored = seeded.store.game_state(state.id).unwrap();
        assert_eq!(stored.status, GameStatus::Completed);
        assert_eq!(stored.current_scene_id, Some(delivered.scene_id));
        assert_eq!(stored.completed_at, Some(now()));
    }

    #[tokio::test]
    async fn test_delivery_rejects_bad_input() {
        let seeded = Seeded::playing(tension_scene(&[3]));
        let clock = FixedClock(now());
        let ids = SequentialIds::new();
        let mut unknown_story = delivery(&seeded, "abc", tension_scene(&[1]));
        unknown_story.story_id = Uuid::new_v4();

        let blank = handle_record_generated_scene(
            &delivery(&seeded, " ", tension_scene(&[1])),
            &clock,
            &ids,
            &seeded.store,
        )
        .await;
        let malformed = handle_record_generated_scene(
            &delivery(&seeded, "abc", json!({"ch": "not a list"})),
            &clock,
            &ids,
            &seeded.store,
        )
        .await;
        let missing = handle_record_generated_scene(&unknown_story, &clock, &ids, &seeded.store).await;

        assert!(matches!(blank, Err(DomainError::Validation(_))));
        assert!(matches!(malformed, Err(DomainError::Validation(_))));
        assert!(matches!(missing, Err(DomainError::StoryNotFound(_))));
        assert_eq!(seeded.store.scenes().len(), 1);
    }

    fn failure(state: &PlayerGameState) -> RecordGenerationFailure {
        RecordGenerationFailure {
            correlation_id: Uuid::new_v4(),
            game_state_id: state.id,
            detail: "worker timed out".into(),
        }
    }

    #[tokio::test]
    async fn test_failure_moves_waiting_slot_to_error() {
        // Arrange
        let seeded = Seeded::playing(tension_scene(&[3]));
        let state = park(&seeded, seeded.game_state.clone(), "abc", false);

        // Act
        let recorded =
            handle_record_generation_failure(&failure(&state), &FixedClock(now()), &seeded.store)
                .await
                .unwrap();

        // Assert
        assert!(recorded);
        let stored = seeded.store.game_state(state.id).unwrap();
        assert_eq!(stored.status, GameStatus::Error);
        assert_eq!(stored.error_details.as_deref(), Some("worker timed out"));
    }

    #[tokio::test]
    async fn test_stale_failure_is_ignored() {
        // Arrange
        let seeded = Seeded::playing(tension_scene(&[3]));

        // Act
        let recorded = handle_record_generation_failure(
            &failure(&seeded.game_state),
            &FixedClock(now()),
            &seeded.store,
        )
        .await
        .unwrap();

        // Assert
        assert!(!recorded);
        assert_eq!(seeded.store.game_state(seeded.game_state.id), Some(seeded.game_state.clone()));
    }

    #[tokio::test]
    async fn test_failure_for_unknown_slot_is_not_found() {
        let seeded = Seeded::playing(tension_scene(&[3]));
        let mut command = failure(&seeded.game_state);
        command.game_state_id = Uuid::new_v4();

        let result = handle_record_generation_failure(&command, &FixedClock(now()), &seeded.store).await;

        assert!(matches!(result, Err(DomainError::GameStateNotFound(_))));
    }
}
