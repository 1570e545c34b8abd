//! Commands for the game loop.

use serde_json::Value;
use storyloop_core::command::Command;
use uuid::Uuid;

/// Command to submit the player's picks for the current scene.
#[derive(Debug, Clone)]
pub struct MakeChoice {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting player.
    pub player_id: Uuid,
    /// The save slot being played.
    pub game_state_id: Uuid,
    /// One option index per choice block, in block order.
    pub selected_option_indices: Vec<usize>,
}

impl Command for MakeChoice {
    fn command_type(&self) -> &'static str {
        "gameplay.make_choice"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor(&self) -> Option<Uuid> {
        Some(self.player_id)
    }
}

/// Command to open a new save slot on a story.
#[derive(Debug, Clone)]
pub struct StartGame {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting player.
    pub player_id: Uuid,
    /// The story to play.
    pub story_id: Uuid,
}

impl Command for StartGame {
    fn command_type(&self) -> &'static str {
        "gameplay.start_game"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor(&self) -> Option<Uuid> {
        Some(self.player_id)
    }
}

/// Command to re-request generation for a stuck or failed save slot.
#[derive(Debug, Clone)]
pub struct RetryGeneration {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting player.
    pub player_id: Uuid,
    /// The save slot to retry.
    pub game_state_id: Uuid,
}

impl Command for RetryGeneration {
    fn command_type(&self) -> &'static str {
        "gameplay.retry_generation"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor(&self) -> Option<Uuid> {
        Some(self.player_id)
    }
}

/// Command to delete a save slot.
#[derive(Debug, Clone)]
pub struct DeleteGameState {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The acting player.
    pub player_id: Uuid,
    /// The save slot to delete.
    pub game_state_id: Uuid,
}

impl Command for DeleteGameState {
    fn command_type(&self) -> &'static str {
        "gameplay.delete_game_state"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor(&self) -> Option<Uuid> {
        Some(self.player_id)
    }
}

/// Worker report: content for a fingerprint is ready.
#[derive(Debug, Clone)]
pub struct RecordGeneratedScene {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story the content belongs to.
    pub story_id: Uuid,
    /// Fingerprint the content was generated for.
    pub state_hash: String,
    /// The scene or ending document.
    pub content: Value,
}

impl Command for RecordGeneratedScene {
    fn command_type(&self) -> &'static str {
        "gameplay.record_generated_scene"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Worker report: generation for a save slot failed.
#[derive(Debug, Clone)]
pub struct RecordGenerationFailure {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The save slot whose task failed.
    pub game_state_id: Uuid,
    /// Failure detail shown to the player on the next read.
    pub detail: String,
}

impl Command for RecordGenerationFailure {
    fn command_type(&self) -> &'static str {
        "gameplay.record_generation_failure"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
