//! Player game states (save slots) and their state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Where a save slot is in the game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// A scene is available and the player may choose.
    Playing,
    /// Waiting for the worker to deliver the next scene.
    GeneratingScene,
    /// A stat tripped its bound; waiting for the ending.
    GameOverPending,
    /// The ending has been delivered.
    Completed,
    /// Generation failed; only a retry leaves this status.
    Error,
}

impl GameStatus {
    /// Returns the stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::GeneratingScene => "generating_scene",
            Self::GameOverPending => "game_over_pending",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether a generation task is in flight for a game in this status.
    #[must_use]
    pub fn awaits_generation(self) -> bool {
        matches!(self, Self::GeneratingScene | Self::GameOverPending)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(Self::Playing),
            "generating_scene" => Ok(Self::GeneratingScene),
            "game_over_pending" => Ok(Self::GameOverPending),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(DomainError::Internal(format!(
                "unknown game status: {other}"
            ))),
        }
    }
}

/// One save slot for one player on one story.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameState {
    pub id: Uuid,
    pub player_id: Uuid,
    pub story_id: Uuid,
    pub status: GameStatus,
    /// Scene being played, or the ending once completed. `None` while
    /// waiting for generation.
    pub current_scene_id: Option<Uuid>,
    pub current_progress_id: Uuid,
    /// Failure detail reported by the worker while in `Error`.
    pub error_details: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlayerGameState {
    /// Creates a save slot positioned on `progress_id`.
    ///
    /// With a scene the game starts `Playing`; without one it starts in
    /// `GeneratingScene` and the caller is expected to dispatch the task.
    #[must_use]
    pub fn start(
        id: Uuid,
        player_id: Uuid,
        story_id: Uuid,
        progress_id: Uuid,
        scene_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if scene_id.is_some() {
            GameStatus::Playing
        } else {
            GameStatus::GeneratingScene
        };
        Self {
            id,
            player_id,
            story_id,
            status,
            current_scene_id: scene_id,
            current_progress_id: progress_id,
            error_details: None,
            started_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns `DomainError::Forbidden` if the slot belongs to someone else.
    pub fn ensure_owned_by(&self, player_id: Uuid) -> Result<(), DomainError> {
        if self.player_id == player_id {
            Ok(())
        } else {
            Err(DomainError::Forbidden(self.id))
        }
    }

    /// Fails unless the player may submit a choice.
    ///
    /// # Errors
    ///
    /// `NeedsGeneration` while a scene is generating, `EndingPending` while
    /// the ending is, `StateInError` (with the recorded detail) after a
    /// failed generation, and `InvalidOperation` once the game is completed.
    pub fn ensure_playing(&self) -> Result<(), DomainError> {
        match self.status {
            GameStatus::Playing => Ok(()),
            GameStatus::GeneratingScene => Err(DomainError::NeedsGeneration(self.id)),
            GameStatus::GameOverPending => Err(DomainError::EndingPending(self.id)),
            GameStatus::Error => Err(DomainError::StateInError {
                game_state_id: self.id,
                detail: self.error_details.clone(),
            }),
            GameStatus::Completed => Err(DomainError::InvalidOperation(
                "cannot make a choice in a completed game".into(),
            )),
        }
    }

    /// Moves onto an existing scene.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` from `GameOverPending` or
    /// `Completed`.
    pub fn advance_to_scene(
        &mut self,
        scene_id: Uuid,
        progress_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_from(
            &[
                GameStatus::Playing,
                GameStatus::GeneratingScene,
                GameStatus::Error,
            ],
            GameStatus::Playing,
        )?;
        self.status = GameStatus::Playing;
        self.current_scene_id = Some(scene_id);
        self.current_progress_id = progress_id;
        self.error_details = None;
        self.last_activity_at = now;
        Ok(())
    }

    /// Parks the game on `progress_id` until its scene is generated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` from `GameOverPending` or
    /// `Completed`.
    pub fn await_scene(&mut self, progress_id: Uuid, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_from(
            &[
                GameStatus::Playing,
                GameStatus::GeneratingScene,
                GameStatus::Error,
            ],
            GameStatus::GeneratingScene,
        )?;
        self.status = GameStatus::GeneratingScene;
        self.current_scene_id = None;
        self.current_progress_id = progress_id;
        self.error_details = None;
        self.last_activity_at = now;
        Ok(())
    }

    /// Parks the game on its final node until the ending is generated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` from `GeneratingScene` or
    /// `Completed`.
    pub fn await_ending(&mut self, progress_id: Uuid, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_from(
            &[
                GameStatus::Playing,
                GameStatus::GameOverPending,
                GameStatus::Error,
            ],
            GameStatus::GameOverPending,
        )?;
        self.status = GameStatus::GameOverPending;
        self.current_scene_id = None;
        self.current_progress_id = progress_id;
        self.error_details = None;
        self.last_activity_at = now;
        Ok(())
    }

    /// Finishes the game on its ending scene.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` from `GeneratingScene` or
    /// `Completed`.
    pub fn complete(
        &mut self,
        ending_scene_id: Uuid,
        progress_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_from(
            &[
                GameStatus::Playing,
                GameStatus::GameOverPending,
                GameStatus::Error,
            ],
            GameStatus::Completed,
        )?;
        self.status = GameStatus::Completed;
        self.current_scene_id = Some(ending_scene_id);
        self.current_progress_id = progress_id;
        self.error_details = None;
        self.last_activity_at = now;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Records a generation failure.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` unless generation is in flight.
    pub fn fail(&mut self, detail: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_from(
            &[GameStatus::GeneratingScene, GameStatus::GameOverPending],
            GameStatus::Error,
        )?;
        self.status = GameStatus::Error;
        self.error_details = Some(detail);
        self.last_activity_at = now;
        Ok(())
    }

    fn ensure_from(&self, allowed: &[GameStatus], to: GameStatus) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidOperation(format!(
                "game state {} cannot move from {} to {to}",
                self.id, self.status
            )))
        }
    }
}
