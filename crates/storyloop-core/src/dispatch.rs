//! Generation task envelope and the dispatcher port.
//!
//! The dispatcher only hands a task to the generation worker; the worker
//! writes its results back out of band through the result intake.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;
use crate::story::Termination;

/// What the worker is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// The first scene of a story.
    InitialScene,
    /// The scene following a choice.
    ContinueScene,
    /// The ending after a game over.
    GenerateEnding,
}

impl PromptType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialScene => "initial_scene",
            Self::ContinueScene => "continue_scene",
            Self::GenerateEnding => "generate_ending",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact record of one decision, forwarded so generation can narrate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MadeChoice {
    /// Description of the choice block.
    pub block: String,
    /// Text of the chosen option.
    pub option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Everything the worker needs to write the next piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    pub story_config: Value,
    /// Full setup for scenes; only the character roster for endings.
    pub story_setup: Value,
    pub core_stats: BTreeMap<String, i64>,
    pub story_variables: BTreeMap<String, Value>,
    pub global_flags: BTreeSet<String>,
    pub encountered_characters: Vec<String>,
    pub last_story_summary: Option<String>,
    pub last_future_direction: Option<String>,
    pub last_var_impact_summary: Option<String>,
    pub made_choices: Vec<MadeChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
}

/// The envelope handed to the generation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: Uuid,
    pub player_id: Uuid,
    pub story_id: Uuid,
    pub game_state_id: Uuid,
    pub prompt_type: PromptType,
    /// Fingerprint the content is to be stored under.
    pub state_hash: String,
    pub language: String,
    pub input: GenerationInput,
}

impl GenerationTask {
    #[must_use]
    pub fn is_ending(&self) -> bool {
        self.prompt_type == PromptType::GenerateEnding
    }
}

/// Hands generation tasks to the worker. Success means the task was
/// accepted, nothing more.
#[async_trait]
pub trait GenerationDispatcher: Send + Sync {
    /// Dispatches an initial or continue-scene task.
    async fn dispatch_generation(&self, task: &GenerationTask) -> Result<(), DomainError>;

    /// Dispatches an ending task.
    async fn dispatch_ending(&self, task: &GenerationTask) -> Result<(), DomainError>;
}
