//! Progress nodes: shared, content-addressed snapshots of narrative state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Fingerprint of the state every game starts from.
pub const INITIAL_STATE_HASH: &str = "initial";

/// Accumulated narrative state at one fingerprint.
///
/// At most one node exists per `(story_id, state_hash)`. A node is never
/// edited once stored; the engine copies it into a candidate with
/// [`PlayerProgress::next_candidate`] and upserts the result.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProgress {
    pub id: Uuid,
    pub story_id: Uuid,
    pub core_stats: BTreeMap<String, i64>,
    pub story_variables: BTreeMap<String, Value>,
    pub global_flags: BTreeSet<String>,
    /// Fingerprint this node is stored under.
    pub state_hash: String,
    /// Number of scenes played to reach this node.
    pub scene_index: i32,
    pub encountered_characters: Vec<String>,
    /// Story summary so far, produced by the previous generation step.
    pub last_story_summary: Option<String>,
    /// Planned future direction, produced by the previous generation step.
    pub last_future_direction: Option<String>,
    /// How story variables shaped the previous scene.
    pub last_var_impact_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PlayerProgress {
    /// Builds the initial node for a story.
    #[must_use]
    pub fn initial(
        id: Uuid,
        story_id: Uuid,
        core_stats: BTreeMap<String, i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            story_id,
            core_stats,
            story_variables: BTreeMap::new(),
            global_flags: BTreeSet::new(),
            state_hash: INITIAL_STATE_HASH.to_owned(),
            scene_index: 0,
            encountered_characters: Vec::new(),
            last_story_summary: None,
            last_future_direction: None,
            last_var_impact_summary: None,
            created_at: now,
        }
    }

    /// Whether this node is the story's starting point.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.state_hash == INITIAL_STATE_HASH
    }

    /// Copies this node into a fresh candidate one scene further on. The
    /// candidate keeps the parent's fingerprint until the caller finalises it.
    #[must_use]
    pub fn next_candidate(&self, id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            story_id: self.story_id,
            core_stats: self.core_stats.clone(),
            story_variables: self.story_variables.clone(),
            global_flags: self.global_flags.clone(),
            state_hash: self.state_hash.clone(),
            scene_index: self.scene_index + 1,
            encountered_characters: self.encountered_characters.clone(),
            last_story_summary: self.last_story_summary.clone(),
            last_future_direction: self.last_future_direction.clone(),
            last_var_impact_summary: self.last_var_impact_summary.clone(),
            created_at: now,
        }
    }

    /// Records a character as encountered, keeping first-seen order.
    pub fn encounter(&mut self, character: &str) {
        if character.is_empty() {
            return;
        }
        if !self.encountered_characters.iter().any(|c| c == character) {
            self.encountered_characters.push(character.to_owned());
        }
    }
}
