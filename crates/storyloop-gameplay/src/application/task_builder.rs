//! Builds generation task envelopes from a progress node.

use serde_json::Value;
use storyloop_core::dispatch::{GenerationInput, GenerationTask, MadeChoice, PromptType};
use storyloop_core::error::DomainError;
use storyloop_core::progress::PlayerProgress;
use storyloop_core::story::{PublishedStory, StorySetup, Termination};
use uuid::Uuid;

/// Who the task is for and where its result goes.
pub(crate) struct TaskTarget {
    pub task_id: Uuid,
    pub player_id: Uuid,
    pub game_state_id: Uuid,
}

/// Task for an initial or follow-up scene at `progress`.
pub(crate) fn scene_task(
    target: TaskTarget,
    prompt_type: PromptType,
    story: &PublishedStory,
    progress: &PlayerProgress,
    made_choices: Vec<MadeChoice>,
) -> GenerationTask {
    envelope(
        target,
        prompt_type,
        story,
        progress,
        story.setup.clone(),
        made_choices,
        None,
    )
}

/// Task for the ending at `progress`. Only the character roster of the
/// setup is forwarded.
pub(crate) fn ending_task(
    target: TaskTarget,
    story: &PublishedStory,
    setup: &StorySetup,
    progress: &PlayerProgress,
    made_choices: Vec<MadeChoice>,
    termination: Termination,
) -> Result<GenerationTask, DomainError> {
    let characters = serde_json::to_value(&setup.characters)
        .map_err(|e| DomainError::Internal(format!("character roster serialisation failed: {e}")))?;
    let mut excerpt = serde_json::Map::new();
    excerpt.insert("characters".to_owned(), characters);
    Ok(envelope(
        target,
        PromptType::GenerateEnding,
        story,
        progress,
        Value::Object(excerpt),
        made_choices,
        Some(termination),
    ))
}

fn envelope(
    target: TaskTarget,
    prompt_type: PromptType,
    story: &PublishedStory,
    progress: &PlayerProgress,
    story_setup: Value,
    made_choices: Vec<MadeChoice>,
    termination: Option<Termination>,
) -> GenerationTask {
    GenerationTask {
        task_id: target.task_id,
        player_id: target.player_id,
        story_id: story.id,
        game_state_id: target.game_state_id,
        prompt_type,
        state_hash: progress.state_hash.clone(),
        language: story.language.clone(),
        input: GenerationInput {
            story_config: story.config.clone(),
            story_setup,
            core_stats: progress.core_stats.clone(),
            story_variables: progress.story_variables.clone(),
            global_flags: progress.global_flags.clone(),
            encountered_characters: progress.encountered_characters.clone(),
            last_story_summary: progress.last_story_summary.clone(),
            last_future_direction: progress.last_future_direction.clone(),
            last_var_impact_summary: progress.last_var_impact_summary.clone(),
            made_choices,
            termination,
        },
    }
}
