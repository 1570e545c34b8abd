//! Seed data shared by the handler tests.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use storyloop_core::game_state::PlayerGameState;
use storyloop_core::progress::PlayerProgress;
use storyloop_core::scene::StoryScene;
use storyloop_core::story::{PublishedStory, StoryStatus};
use storyloop_test_support::InMemoryGameStore;
use uuid::Uuid;

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// A ready story with `courage` and `tension`, both bounded to `[0, 10]`.
pub(crate) fn story() -> PublishedStory {
    PublishedStory {
        id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
        status: StoryStatus::Ready,
        config: json!({"premise": "A lighthouse keeper hears knocking."}),
        setup: json!({
            "stats": {
                "courage": {"initial": 5, "min": 0, "max": 10},
                "tension": {"initial": 4, "min": 0, "max": 10}
            },
            "characters": [{"name": "Mara", "description": "The keeper's sister"}],
            "world_rules": ["The lamp must never go out"]
        }),
        language: "en".into(),
    }
}

/// One required block whose options move `tension` by the given deltas.
pub(crate) fn tension_scene(deltas: &[i64]) -> Value {
    let options: Vec<Value> = deltas
        .iter()
        .map(|d| json!({"txt": format!("tension {d:+}"), "cons": {"cs": {"tension": d}}}))
        .collect();
    json!({
        "ch": [{"desc": "The knocking grows louder", "char": "Mara", "opts": options}],
        "sssf": "The storm has cut the island off.",
        "fd": "Someone is outside."
    })
}

pub(crate) fn initial_stats() -> BTreeMap<String, i64> {
    BTreeMap::from([("courage".to_owned(), 5), ("tension".to_owned(), 4)])
}

/// A player mid-game: story, initial progress node, a scene at the initial
/// fingerprint and a `Playing` save slot on it, all seeded into `store`.
pub(crate) struct Seeded {
    pub store: InMemoryGameStore,
    pub story: PublishedStory,
    pub progress: PlayerProgress,
    pub scene: StoryScene,
    pub game_state: PlayerGameState,
}

impl Seeded {
    pub(crate) fn playing(content: Value) -> Self {
        let store = InMemoryGameStore::new();
        let story = story();
        let progress = PlayerProgress::initial(Uuid::new_v4(), story.id, initial_stats(), now());
        let scene = StoryScene {
            id: Uuid::new_v4(),
            story_id: story.id,
            state_hash: progress.state_hash.clone(),
            content,
            created_at: now(),
        };
        let game_state = PlayerGameState::start(
            Uuid::new_v4(),
            Uuid::new_v4(),
            story.id,
            progress.id,
            Some(scene.id),
            now(),
        );
        store.put_story(story.clone());
        store.put_progress(progress.clone());
        store.put_scene(scene.clone());
        store.put_game_state(game_state.clone());
        Self {
            store,
            story,
            progress,
            scene,
            game_state,
        }
    }

    /// Adds another player's `Playing` save slot on the same scene.
    pub(crate) fn add_player(&self) -> PlayerGameState {
        let state = PlayerGameState::start(
            Uuid::new_v4(),
            Uuid::new_v4(),
            self.story.id,
            self.progress.id,
            Some(self.scene.id),
            now(),
        );
        self.store.put_game_state(state.clone());
        state
    }

    /// Stores a scene for `state_hash`.
    pub(crate) fn put_scene_at(&self, state_hash: &str, content: Value) -> StoryScene {
        let scene = StoryScene {
            id: Uuid::new_v4(),
            story_id: self.story.id,
            state_hash: state_hash.to_owned(),
            content,
            created_at: now(),
        };
        self.store.put_scene(scene.clone());
        scene
    }
}
