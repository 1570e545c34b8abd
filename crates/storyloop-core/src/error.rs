//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a [`DomainError`], used by callers to decide
/// whether to retry, poll, or show a terminal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller's input was malformed. Not retryable as-is.
    Validation,
    /// The target exists in a state (or ownership) that forbids the action.
    Precondition,
    /// Data-integrity or storage failure. Opaque to callers.
    Internal,
    /// The generation task could not be handed off; nothing was committed.
    Dispatch,
}

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The caller supplied invalid input (indices, under-selection, payloads).
    #[error("validation error: {0}")]
    Validation(String),

    /// No player game state exists with this id.
    #[error("player game state not found: {0}")]
    GameStateNotFound(Uuid),

    /// No published story exists with this id.
    #[error("published story not found: {0}")]
    StoryNotFound(Uuid),

    /// The game state exists but belongs to another player.
    #[error("player game state {0} belongs to another player")]
    Forbidden(Uuid),

    /// The next scene for this game state is still being generated.
    #[error("scene for game state {0} is still being generated")]
    NeedsGeneration(Uuid),

    /// The ending for this game state is still being generated.
    #[error("ending for game state {0} is still being generated")]
    EndingPending(Uuid),

    /// Generation failed for this game state; a retry is required.
    #[error("game state {game_state_id} is in error status")]
    StateInError {
        /// The failed game state.
        game_state_id: Uuid,
        /// Failure detail recorded by the generation worker.
        detail: Option<String>,
    },

    /// The action is not allowed in the game state's current status.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The story exists but cannot be played yet.
    #[error("published story {0} is not ready to be played")]
    StoryNotPlayable(Uuid),

    /// The player already holds the maximum number of save slots.
    #[error("save slot limit of {limit} reached")]
    SaveSlotLimitReached {
        /// Configured maximum.
        limit: usize,
    },

    /// The player already has too many generations in flight.
    #[error("generation limit reached: {active} active, limit {limit}")]
    GenerationLimitReached {
        /// Generations currently in flight.
        active: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A data-integrity failure: a linked row is missing or stored content
    /// is malformed.
    #[error("internal error: {0}")]
    Internal(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// The generation task could not be dispatched.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}

impl DomainError {
    /// Returns the taxonomy category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::GameStateNotFound(_)
            | Self::StoryNotFound(_)
            | Self::Forbidden(_)
            | Self::NeedsGeneration(_)
            | Self::EndingPending(_)
            | Self::StateInError { .. }
            | Self::InvalidOperation(_)
            | Self::StoryNotPlayable(_)
            | Self::SaveSlotLimitReached { .. }
            | Self::GenerationLimitReached { .. } => ErrorCategory::Precondition,
            Self::Internal(_) | Self::Infrastructure(_) => ErrorCategory::Internal,
            Self::Dispatch(_) => ErrorCategory::Dispatch,
        }
    }

    /// Validation and precondition failures are expected control flow and
    /// must not be logged at error severity.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Precondition
        )
    }
}
