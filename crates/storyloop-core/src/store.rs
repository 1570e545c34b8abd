//! Transactional store ports.
//!
//! Every use case runs inside one [`GameUnitOfWork`]. Progress nodes and
//! scenes are keyed by `(story_id, state_hash)`; implementations enforce that
//! key with a uniqueness constraint and resolve insert conflicts to the row
//! that already exists instead of failing.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;
use crate::game_state::PlayerGameState;
use crate::progress::PlayerProgress;
use crate::scene::StoryScene;
use crate::story::PublishedStory;

/// Opens units of work.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Begins a new transaction.
    async fn begin(&self) -> Result<Box<dyn GameUnitOfWork>, DomainError>;
}

/// One open transaction. Dropping it without `commit` discards every write.
#[async_trait]
pub trait GameUnitOfWork: Send {
    /// Loads a game state and holds a row lock on it until the transaction
    /// ends, so two actions on the same save slot are serialised.
    async fn lock_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError>;

    /// Loads a game state without locking it.
    async fn load_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError>;

    async fn load_progress(&mut self, id: Uuid) -> Result<Option<PlayerProgress>, DomainError>;

    async fn load_scene(&mut self, id: Uuid) -> Result<Option<StoryScene>, DomainError>;

    async fn load_story(&mut self, id: Uuid) -> Result<Option<PublishedStory>, DomainError>;

    /// Exact lookup of the scene generated for a fingerprint. Never creates.
    async fn find_scene(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<StoryScene>, DomainError>;

    /// Exact lookup of the progress node stored under a fingerprint.
    async fn find_progress(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<PlayerProgress>, DomainError>;

    /// Persists `candidate` unless a node already exists for its
    /// `(story_id, state_hash)`, and returns the id of the node that is
    /// stored under that key. A losing racer gets the winner's id and its
    /// candidate is discarded.
    async fn upsert_progress(&mut self, candidate: &PlayerProgress) -> Result<Uuid, DomainError>;

    /// Persists `scene` unless one already exists for its
    /// `(story_id, state_hash)`, and returns the id of the stored scene.
    async fn insert_scene_if_absent(&mut self, scene: &StoryScene) -> Result<Uuid, DomainError>;

    /// Inserts or replaces a game state.
    async fn save_game_state(&mut self, state: &PlayerGameState) -> Result<(), DomainError>;

    /// A player's save slots for one story, most recent activity first.
    async fn list_game_states(
        &mut self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError>;

    /// Game states parked on `progress_id` waiting for generation.
    async fn list_pending_for_progress(
        &mut self,
        progress_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError>;

    /// Deletes a save slot owned by `player_id`. Returns whether a row was
    /// removed.
    async fn delete_game_state(&mut self, id: Uuid, player_id: Uuid) -> Result<bool, DomainError>;

    /// Number of the player's game states with generation in flight.
    async fn count_active_generations(&mut self, player_id: Uuid) -> Result<i64, DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
