//! Generated scenes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Generated content for one `(story_id, state_hash)` pair.
///
/// Written by the generation worker's result intake and read-only to the
/// game loop. The `content` document is interpreted by the gameplay crate.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryScene {
    pub id: Uuid,
    pub story_id: Uuid,
    /// Fingerprint the scene was generated for.
    pub state_hash: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}
