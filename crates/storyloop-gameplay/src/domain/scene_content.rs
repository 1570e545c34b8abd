//! Typed view over a scene's content document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storyloop_core::error::DomainError;

use super::consequences::Consequences;

/// Parsed scene content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneContent {
    /// Choice blocks, in presentation order.
    #[serde(default, rename = "ch")]
    pub choices: Vec<ChoiceBlock>,
    #[serde(default, rename = "sssf", skip_serializing_if = "Option::is_none")]
    pub story_summary_so_far: Option<String>,
    #[serde(default, rename = "fd", skip_serializing_if = "Option::is_none")]
    pub future_direction: Option<String>,
    #[serde(default, rename = "vis", skip_serializing_if = "Option::is_none")]
    pub var_impact_summary: Option<String>,
    #[serde(default, rename = "et", skip_serializing_if = "Option::is_none")]
    pub ending_text: Option<String>,
}

/// One decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceBlock {
    #[serde(rename = "desc")]
    pub description: String,
    /// Character the block is about, if any.
    #[serde(default, rename = "char", skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    /// Whether the player must answer this block.
    #[serde(default = "default_required", rename = "req")]
    pub required: bool,
    #[serde(rename = "opts")]
    pub options: Vec<ChoiceOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    #[serde(rename = "txt")]
    pub text: String,
    #[serde(default, rename = "cons")]
    pub consequences: Consequences,
}

fn default_required() -> bool {
    true
}

impl SceneContent {
    /// Parses stored scene content.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Internal` for malformed content; stored scenes
    /// are written by the worker and are expected to be well-formed.
    pub fn parse(content: &Value) -> Result<Self, DomainError> {
        serde_json::from_value(content.clone())
            .map_err(|e| DomainError::Internal(format!("malformed scene content: {e}")))
    }

    /// Whether a selection of `selected_len` leading blocks leaves a
    /// required block unanswered.
    #[must_use]
    pub fn leaves_required_unanswered(&self, selected_len: usize) -> bool {
        self.choices
            .iter()
            .skip(selected_len)
            .any(|block| block.required)
    }

    /// Checks a selection against this scene: non-empty, at most one index
    /// per block, and each index in range for its block.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first problem.
    pub fn validate_selection(&self, selected: &[usize]) -> Result<(), DomainError> {
        if selected.is_empty() {
            return Err(DomainError::Validation(
                "selected_option_indices cannot be empty".into(),
            ));
        }
        if selected.len() > self.choices.len() {
            return Err(DomainError::Validation(format!(
                "{} indices selected but the scene has {} choice blocks",
                selected.len(),
                self.choices.len()
            )));
        }
        for (block_index, (&option_index, block)) in
            selected.iter().zip(&self.choices).enumerate()
        {
            if option_index >= block.options.len() {
                return Err(DomainError::Validation(format!(
                    "option index {option_index} out of range for block {block_index} with {} options",
                    block.options.len()
                )));
            }
        }
        Ok(())
    }
}
