//! In-memory and failing `GameStore` implementations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storyloop_core::error::DomainError;
use storyloop_core::game_state::PlayerGameState;
use storyloop_core::progress::PlayerProgress;
use storyloop_core::scene::StoryScene;
use storyloop_core::store::{GameStore, GameUnitOfWork};
use storyloop_core::story::PublishedStory;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    stories: HashMap<Uuid, PublishedStory>,
    progress: HashMap<Uuid, PlayerProgress>,
    scenes: HashMap<Uuid, StoryScene>,
    game_states: HashMap<Uuid, PlayerGameState>,
    /// Uncommitted progress or scene rows, with the units of work holding them.
    provisional: HashMap<Uuid, HashSet<usize>>,
}

impl Tables {
    /// Records that unit of work `unit` holds row `id` until it finishes.
    fn claim(&mut self, id: Uuid, unit: usize) {
        self.provisional.entry(id).or_default().insert(unit);
    }
}

#[derive(Debug, Default)]
struct Counters {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    units: AtomicUsize,
}

/// An in-memory store with unit-of-work semantics close enough to the
/// Postgres one for handler tests.
///
/// Progress nodes and scenes are keyed by `(story_id, state_hash)` like the
/// real unique constraints: inserts resolve to the existing row and become
/// visible to other units of work at once. An uncommitted row is held by
/// its writer and by every unit of work that resolved to it; it becomes
/// permanent when any of them commits and is removed only once all of them
/// have rolled back. Postgres instead makes the second writer wait for the
/// first to finish, which ends in the same rows. Game-state writes stay
/// private to the unit of work until it commits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGameStore {
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
}

impl InMemoryGameStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a story.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_story(&self, story: PublishedStory) {
        self.tables.lock().unwrap().stories.insert(story.id, story);
    }

    /// Seeds a progress node.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_progress(&self, progress: PlayerProgress) {
        self.tables
            .lock()
            .unwrap()
            .progress
            .insert(progress.id, progress);
    }

    /// Seeds a scene.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_scene(&self, scene: StoryScene) {
        self.tables.lock().unwrap().scenes.insert(scene.id, scene);
    }

    /// Seeds a game state.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put_game_state(&self, state: PlayerGameState) {
        self.tables
            .lock()
            .unwrap()
            .game_states
            .insert(state.id, state);
    }

    /// Committed game state by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn game_state(&self, id: Uuid) -> Option<PlayerGameState> {
        self.tables.lock().unwrap().game_states.get(&id).cloned()
    }

    /// Number of committed game states.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn game_state_count(&self) -> usize {
        self.tables.lock().unwrap().game_states.len()
    }

    /// Every stored progress node.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn progress_nodes(&self) -> Vec<PlayerProgress> {
        self.tables
            .lock()
            .unwrap()
            .progress
            .values()
            .cloned()
            .collect()
    }

    /// Progress node by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn progress(&self, id: Uuid) -> Option<PlayerProgress> {
        self.tables.lock().unwrap().progress.get(&id).cloned()
    }

    /// Every stored scene.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn scenes(&self) -> Vec<StoryScene> {
        self.tables
            .lock()
            .unwrap()
            .scenes
            .values()
            .cloned()
            .collect()
    }

    /// Number of committed units of work.
    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    /// Number of rolled-back units of work.
    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn begin(&self) -> Result<Box<dyn GameUnitOfWork>, DomainError> {
        Ok(Box::new(InMemoryUnitOfWork {
            unit: self.counters.units.fetch_add(1, Ordering::SeqCst),
            tables: Arc::clone(&self.tables),
            counters: Arc::clone(&self.counters),
            claimed: Vec::new(),
            pending_states: HashMap::new(),
        }))
    }
}

/// Pending game-state writes: `None` marks a delete.
type PendingStates = HashMap<Uuid, Option<PlayerGameState>>;

struct InMemoryUnitOfWork {
    unit: usize,
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
    /// Provisional rows this unit of work wrote or resolved to.
    claimed: Vec<Uuid>,
    pending_states: PendingStates,
}

impl InMemoryUnitOfWork {
    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    /// Game states as this unit of work sees them.
    fn visible_states(&self) -> Vec<PlayerGameState> {
        let tables = self.tables();
        let mut merged: HashMap<Uuid, PlayerGameState> = tables.game_states.clone();
        for (id, pending) in &self.pending_states {
            match pending {
                Some(state) => {
                    merged.insert(*id, state.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged.into_values().collect()
    }

    /// Joins the holders of `id` if the row is still uncommitted.
    fn adopt(&mut self, tables: &mut Tables, id: Uuid) {
        if let Some(holders) = tables.provisional.get_mut(&id) {
            holders.insert(self.unit);
            if !self.claimed.contains(&id) {
                self.claimed.push(id);
            }
        }
    }

    fn visible_state(&self, id: Uuid) -> Option<PlayerGameState> {
        match self.pending_states.get(&id) {
            Some(pending) => pending.clone(),
            None => self.tables().game_states.get(&id).cloned(),
        }
    }
}

#[async_trait]
impl GameUnitOfWork for InMemoryUnitOfWork {
    async fn lock_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError> {
        Ok(self.visible_state(id))
    }

    async fn load_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError> {
        Ok(self.visible_state(id))
    }

    async fn load_progress(&mut self, id: Uuid) -> Result<Option<PlayerProgress>, DomainError> {
        Ok(self.tables().progress.get(&id).cloned())
    }

    async fn load_scene(&mut self, id: Uuid) -> Result<Option<StoryScene>, DomainError> {
        Ok(self.tables().scenes.get(&id).cloned())
    }

    async fn load_story(&mut self, id: Uuid) -> Result<Option<PublishedStory>, DomainError> {
        Ok(self.tables().stories.get(&id).cloned())
    }

    async fn find_scene(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<StoryScene>, DomainError> {
        Ok(self
            .tables()
            .scenes
            .values()
            .find(|s| s.story_id == story_id && s.state_hash == state_hash)
            .cloned())
    }

    async fn find_progress(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<PlayerProgress>, DomainError> {
        Ok(self
            .tables()
            .progress
            .values()
            .find(|p| p.story_id == story_id && p.state_hash == state_hash)
            .cloned())
    }

    async fn upsert_progress(&mut self, candidate: &PlayerProgress) -> Result<Uuid, DomainError> {
        let shared = Arc::clone(&self.tables);
        let mut tables = shared.lock().unwrap();
        let existing = tables
            .progress
            .values()
            .find(|p| p.story_id == candidate.story_id && p.state_hash == candidate.state_hash)
            .map(|p| p.id);
        if let Some(id) = existing {
            self.adopt(&mut tables, id);
            return Ok(id);
        }
        tables.progress.insert(candidate.id, candidate.clone());
        tables.claim(candidate.id, self.unit);
        self.claimed.push(candidate.id);
        Ok(candidate.id)
    }

    async fn insert_scene_if_absent(&mut self, scene: &StoryScene) -> Result<Uuid, DomainError> {
        let shared = Arc::clone(&self.tables);
        let mut tables = shared.lock().unwrap();
        let existing = tables
            .scenes
            .values()
            .find(|s| s.story_id == scene.story_id && s.state_hash == scene.state_hash)
            .map(|s| s.id);
        if let Some(id) = existing {
            self.adopt(&mut tables, id);
            return Ok(id);
        }
        tables.scenes.insert(scene.id, scene.clone());
        tables.claim(scene.id, self.unit);
        self.claimed.push(scene.id);
        Ok(scene.id)
    }

    async fn save_game_state(&mut self, state: &PlayerGameState) -> Result<(), DomainError> {
        self.pending_states.insert(state.id, Some(state.clone()));
        Ok(())
    }

    async fn list_game_states(
        &mut self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        let mut states: Vec<PlayerGameState> = self
            .visible_states()
            .into_iter()
            .filter(|s| s.player_id == player_id && s.story_id == story_id)
            .collect();
        states.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(states)
    }

    async fn list_pending_for_progress(
        &mut self,
        progress_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        Ok(self
            .visible_states()
            .into_iter()
            .filter(|s| s.current_progress_id == progress_id && s.status.awaits_generation())
            .collect())
    }

    async fn delete_game_state(&mut self, id: Uuid, player_id: Uuid) -> Result<bool, DomainError> {
        match self.visible_state(id) {
            Some(state) if state.player_id == player_id => {
                self.pending_states.insert(id, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_active_generations(&mut self, player_id: Uuid) -> Result<i64, DomainError> {
        let count = self
            .visible_states()
            .iter()
            .filter(|s| s.player_id == player_id && s.status.awaits_generation())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self {
            tables,
            counters,
            claimed,
            pending_states,
            ..
        } = *self;
        let mut tables = tables.lock().unwrap();
        for id in &claimed {
            tables.provisional.remove(id);
        }
        for (id, pending) in pending_states {
            match pending {
                Some(state) => {
                    tables.game_states.insert(id, state);
                }
                None => {
                    tables.game_states.remove(&id);
                }
            }
        }
        drop(tables);
        counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().unwrap();
        for id in &self.claimed {
            let Some(holders) = tables.provisional.get_mut(id) else {
                continue;
            };
            holders.remove(&self.unit);
            if holders.is_empty() {
                tables.provisional.remove(id);
                tables.progress.remove(id);
                tables.scenes.remove(id);
            }
        }
        drop(tables);
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A store whose database is always unreachable.
#[derive(Debug)]
pub struct FailingGameStore;

#[async_trait]
impl GameStore for FailingGameStore {
    async fn begin(&self) -> Result<Box<dyn GameUnitOfWork>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn node(story_id: Uuid) -> PlayerProgress {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut node = PlayerProgress::initial(
            Uuid::new_v4(),
            story_id,
            BTreeMap::from([("tension".to_owned(), 4)]),
            now,
        );
        node.state_hash = "abc".into();
        node
    }

    #[tokio::test]
    async fn test_node_adopted_by_open_unit_survives_writer_rollback() {
        // Arrange
        let store = InMemoryGameStore::new();
        let story_id = Uuid::new_v4();
        let written = node(story_id);
        let mut writer = store.begin().await.unwrap();
        let mut adopter = store.begin().await.unwrap();
        writer.upsert_progress(&written).await.unwrap();
        let adopted_id = adopter.upsert_progress(&node(story_id)).await.unwrap();

        // Act
        writer.rollback().await.unwrap();
        let after_writer = store.progress_nodes();
        adopter.commit().await.unwrap();

        // Assert
        assert_eq!(adopted_id, written.id);
        assert_eq!(after_writer.len(), 1);
        assert_eq!(store.progress(written.id).map(|n| n.id), Some(written.id));
    }

    #[tokio::test]
    async fn test_node_is_removed_once_every_holder_rolls_back() {
        let store = InMemoryGameStore::new();
        let story_id = Uuid::new_v4();
        let mut writer = store.begin().await.unwrap();
        let mut adopter = store.begin().await.unwrap();
        writer.upsert_progress(&node(story_id)).await.unwrap();
        adopter.upsert_progress(&node(story_id)).await.unwrap();

        adopter.rollback().await.unwrap();
        let after_adopter = store.progress_nodes().len();
        writer.rollback().await.unwrap();

        assert_eq!(after_adopter, 1);
        assert!(store.progress_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_committed_node_is_not_removed_by_later_rollback() {
        let store = InMemoryGameStore::new();
        let story_id = Uuid::new_v4();
        let mut writer = store.begin().await.unwrap();
        writer.upsert_progress(&node(story_id)).await.unwrap();
        writer.commit().await.unwrap();

        let mut reader = store.begin().await.unwrap();
        reader.upsert_progress(&node(story_id)).await.unwrap();
        reader.rollback().await.unwrap();

        assert_eq!(store.progress_nodes().len(), 1);
    }
}
