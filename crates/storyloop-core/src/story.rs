//! Published stories, as read by the game loop.
//!
//! Stories are owned by the publishing workflow; the engine only reads the
//! `config` and `setup` documents and checks that the story is playable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

/// Lifecycle status of a published story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    /// Still being authored.
    Draft,
    /// The narrator step is producing config and setup.
    Generating,
    /// Published and playable.
    Ready,
    /// Setup generation failed.
    Error,
}

impl StoryStatus {
    /// Returns the stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(DomainError::Internal(format!(
                "unknown story status: {other}"
            ))),
        }
    }
}

/// A story as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedStory {
    /// Story identifier.
    pub id: Uuid,
    /// The authoring player.
    pub author_id: Uuid,
    /// Current lifecycle status.
    pub status: StoryStatus,
    /// Premise and rules produced by the narrator step. Opaque to the engine.
    pub config: Value,
    /// Stat definitions, character roster and world rules.
    pub setup: Value,
    /// Language tag forwarded to generation.
    pub language: String,
}

impl PublishedStory {
    /// Fails with `StoryNotPlayable` unless the story is ready.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StoryNotPlayable` for any status but `Ready`.
    pub fn ensure_playable(&self) -> Result<(), DomainError> {
        if self.status == StoryStatus::Ready {
            Ok(())
        } else {
            Err(DomainError::StoryNotPlayable(self.id))
        }
    }

    /// Parses the `setup` document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Internal` if the stored setup is malformed.
    pub fn parsed_setup(&self) -> Result<StorySetup, DomainError> {
        StorySetup::from_value(&self.setup)
    }
}

/// Definition of one core stat: starting value and game-over bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDefinition {
    /// Value on a fresh game.
    #[serde(default)]
    pub initial: i64,
    /// Reaching or dropping below this ends the game.
    pub min: i64,
    /// Reaching or exceeding this ends the game.
    pub max: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl StatDefinition {
    /// Which bound `value` trips, if any. Bounds are inclusive: reaching
    /// `min` or `max` is enough.
    #[must_use]
    pub fn breached_bound(&self, value: i64) -> Option<StatBound> {
        if value <= self.min {
            Some(StatBound::Min)
        } else if value >= self.max {
            Some(StatBound::Max)
        } else {
            None
        }
    }

    /// The limit for `bound`.
    #[must_use]
    pub fn limit(&self, bound: StatBound) -> i64 {
        match bound {
            StatBound::Min => self.min,
            StatBound::Max => self.max,
        }
    }
}

/// Which side of a stat's range was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatBound {
    Min,
    Max,
}

/// Why a game ended: the first stat found outside its range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub stat: String,
    pub bound: StatBound,
    /// The bound that was reached.
    pub limit: i64,
    /// The stat's unclamped value.
    pub value: i64,
}

/// A character from the story's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Typed view over the `setup` document. Keys the engine does not know about
/// are kept in `extra` so they can be forwarded to generation untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorySetup {
    /// Stat definitions, ordered by name.
    #[serde(default)]
    pub stats: BTreeMap<String, StatDefinition>,
    #[serde(default)]
    pub characters: Vec<CharacterDefinition>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl StorySetup {
    /// Parses a setup document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Internal` if the document does not match the
    /// expected shape.
    pub fn from_value(value: &Value) -> Result<Self, DomainError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| DomainError::Internal(format!("malformed story setup: {e}")))
    }

    /// Starting stat values for a new game.
    #[must_use]
    pub fn initial_stats(&self) -> BTreeMap<String, i64> {
        self.stats
            .iter()
            .map(|(name, def)| (name.clone(), def.initial))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_setup_parses_stats_characters_and_keeps_unknown_keys() {
        // Arrange
        let value = json!({
            "stats": {
                "tension": {"initial": 4, "min": 0, "max": 10, "description": "How close to breaking"},
                "trust": {"min": -5, "max": 5}
            },
            "characters": [{"name": "Mara"}],
            "world_rules": ["no magic after dusk"]
        });

        // Act
        let setup = StorySetup::from_value(&value).unwrap();

        // Assert
        assert_eq!(setup.stats.len(), 2);
        assert_eq!(setup.stats["tension"].initial, 4);
        assert_eq!(setup.stats["trust"].initial, 0);
        assert_eq!(setup.characters[0].name, "Mara");
        assert_eq!(setup.extra["world_rules"], json!(["no magic after dusk"]));
        assert_eq!(
            setup.initial_stats(),
            BTreeMap::from([("tension".to_owned(), 4), ("trust".to_owned(), 0)])
        );
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let def = StatDefinition {
            initial: 5,
            min: 0,
            max: 10,
            description: None,
        };

        assert_eq!(def.breached_bound(0), Some(StatBound::Min));
        assert_eq!(def.breached_bound(-3), Some(StatBound::Min));
        assert_eq!(def.breached_bound(1), None);
        assert_eq!(def.breached_bound(9), None);
        assert_eq!(def.breached_bound(10), Some(StatBound::Max));
        assert_eq!(def.limit(StatBound::Max), 10);
    }

    #[test]
    fn test_malformed_setup_is_internal_error() {
        let result = StorySetup::from_value(&json!({"stats": {"tension": {"min": "low"}}}));

        assert!(matches!(result, Err(DomainError::Internal(_))));
    }

    #[test]
    fn test_only_ready_story_is_playable() {
        // Arrange
        let mut story = PublishedStory {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            status: StoryStatus::Draft,
            config: json!({}),
            setup: json!({}),
            language: "en".into(),
        };

        // Act / Assert
        assert!(matches!(
            story.ensure_playable(),
            Err(DomainError::StoryNotPlayable(id)) if id == story.id
        ));
        story.status = StoryStatus::Ready;
        assert!(story.ensure_playable().is_ok());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            StoryStatus::Draft,
            StoryStatus::Generating,
            StoryStatus::Ready,
            StoryStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<StoryStatus>().unwrap(), status);
        }
        assert!("published".parse::<StoryStatus>().is_err());
    }
}
