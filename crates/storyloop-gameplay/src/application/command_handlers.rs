//! Command handlers for the game loop.
//!
//! Each handler opens one unit of work, runs the use case against it and
//! either commits (after dispatching any generation task) or rolls back.

use chrono::{DateTime, Utc};
use storyloop_core::dispatch::{GenerationDispatcher, GenerationTask, MadeChoice, PromptType};
use storyloop_core::env::{Clock, IdSource};
use storyloop_core::error::DomainError;
use storyloop_core::game_state::{GameStatus, PlayerGameState};
use storyloop_core::progress::{INITIAL_STATE_HASH, PlayerProgress};
use storyloop_core::store::{GameStore, GameUnitOfWork};
use storyloop_core::story::{PublishedStory, Termination};
use tracing::{Span, field, info, instrument};
use uuid::Uuid;

use crate::domain::commands::{DeleteGameState, MakeChoice, RetryGeneration, StartGame};
use crate::domain::consequences::{apply_consequences, evaluate_bounds};
use crate::domain::fingerprint::compute_state_hash;
use crate::domain::scene_content::SceneContent;

use super::admission::ensure_capacity;
use super::settings::EngineSettings;
use super::task_builder::{TaskTarget, ending_task, scene_task};
use super::unit_of_work::{abandon, commit_after_dispatch, log_failure};

/// Prefix of scratch flags that only live for one step.
const TRANSIENT_FLAG_PREFIX: char = '_';

/// Where a save slot ended up after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    pub game_state_id: Uuid,
    pub status: GameStatus,
    pub current_scene_id: Option<Uuid>,
    pub current_progress_id: Uuid,
    /// Set when a generation task was handed to the worker.
    pub dispatched_task_id: Option<Uuid>,
    /// Set when the choice ended the game.
    pub termination: Option<Termination>,
}

/// What a use case changed, before the commit discipline runs.
struct Applied {
    state: PlayerGameState,
    task: Option<GenerationTask>,
    termination: Option<Termination>,
}

impl Applied {
    fn new(state: PlayerGameState, task: Option<GenerationTask>) -> Self {
        Self {
            state,
            task,
            termination: None,
        }
    }
}

/// Commits after dispatch on success, rolls back on failure.
async fn finish(
    uow: Box<dyn GameUnitOfWork>,
    dispatcher: &dyn GenerationDispatcher,
    result: Result<Applied, DomainError>,
) -> Result<GameOutcome, DomainError> {
    match result {
        Ok(applied) => {
            if let Err(err) = commit_after_dispatch(uow, dispatcher, applied.task.as_ref()).await {
                log_failure(&err);
                return Err(err);
            }
            let state = applied.state;
            info!(status = %state.status, "game state updated");
            Ok(GameOutcome {
                game_state_id: state.id,
                status: state.status,
                current_scene_id: state.current_scene_id,
                current_progress_id: state.current_progress_id,
                dispatched_task_id: applied.task.map(|t| t.task_id),
                termination: applied.termination,
            })
        }
        Err(err) => {
            abandon(uow).await;
            log_failure(&err);
            Err(err)
        }
    }
}

/// Handles the `MakeChoice` command: applies the selected options to a new
/// progress candidate, fingerprints it, and either moves the save slot onto
/// the stored scene for that fingerprint or requests generation.
///
/// # Errors
///
/// Returns `DomainError::Validation` for bad or incomplete selections,
/// a precondition error for a missing, foreign or non-playing save slot,
/// `DomainError::Internal` for missing linked rows or malformed content,
/// and `DomainError::Dispatch` if the generation task could not be handed
/// off (nothing is committed in that case).
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        player_id = %command.player_id,
        game_state_id = %command.game_state_id,
        story_id = field::Empty,
        state_hash = field::Empty,
    )
)]
pub async fn handle_make_choice(
    command: &MakeChoice,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    store: &dyn GameStore,
    dispatcher: &dyn GenerationDispatcher,
) -> Result<GameOutcome, DomainError> {
    let mut uow = store.begin().await?;
    let result = make_choice(&mut *uow, command, clock.now(), ids).await;
    finish(uow, dispatcher, result).await
}

async fn make_choice(
    uow: &mut dyn GameUnitOfWork,
    command: &MakeChoice,
    now: DateTime<Utc>,
    ids: &dyn IdSource,
) -> Result<Applied, DomainError> {
    let mut state = uow
        .lock_game_state(command.game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(command.game_state_id))?;
    state.ensure_owned_by(command.player_id)?;
    state.ensure_playing()?;
    Span::current().record("story_id", field::display(state.story_id));

    let progress = load_progress(uow, &state).await?;
    let scene_id = state.current_scene_id.ok_or_else(|| {
        DomainError::Internal(format!("playing game state {} has no scene", state.id))
    })?;
    let scene = uow
        .load_scene(scene_id)
        .await?
        .ok_or_else(|| DomainError::Internal(format!("scene {scene_id} is missing")))?;
    let story = load_story(uow, &state).await?;
    let setup = story.parsed_setup()?;

    let content = SceneContent::parse(&scene.content)?;
    content.validate_selection(&command.selected_option_indices)?;

    let mut candidate = progress.next_candidate(ids.next_id(), now);
    candidate
        .global_flags
        .retain(|flag| !flag.starts_with(TRANSIENT_FLAG_PREFIX));
    if content.story_summary_so_far.is_some() {
        candidate.last_story_summary.clone_from(&content.story_summary_so_far);
    }
    if content.future_direction.is_some() {
        candidate.last_future_direction.clone_from(&content.future_direction);
    }
    if content.var_impact_summary.is_some() {
        candidate.last_var_impact_summary.clone_from(&content.var_impact_summary);
    }

    let mut made_choices = Vec::with_capacity(command.selected_option_indices.len());
    let mut termination = None;
    for (block, &option_index) in content.choices.iter().zip(&command.selected_option_indices) {
        let option = block.options.get(option_index).ok_or_else(|| {
            DomainError::Internal(format!("option {option_index} vanished after validation"))
        })?;
        termination = apply_consequences(&mut candidate, &option.consequences, &setup);
        made_choices.push(MadeChoice {
            block: block.description.clone(),
            option: option.text.clone(),
            response: option.consequences.response_text.clone(),
        });
        if let Some(character) = &block.character {
            candidate.encounter(character);
        }
        if termination.is_some() {
            break;
        }
    }

    if termination.is_none()
        && content.leaves_required_unanswered(command.selected_option_indices.len())
    {
        return Err(DomainError::Validation(
            "every required choice block must be answered".into(),
        ));
    }

    candidate.state_hash = compute_state_hash(
        &progress.state_hash,
        &candidate.core_stats,
        &candidate.story_variables,
        &candidate.global_flags,
    )?;
    Span::current().record("state_hash", field::display(&candidate.state_hash));
    let progress_id = uow.upsert_progress(&candidate).await?;
    candidate.id = progress_id;

    let existing = uow.find_scene(story.id, &candidate.state_hash).await?;
    let reported = termination.clone();
    let task = match (termination, existing) {
        (Some(termination), Some(ending)) => {
            info!(stat = %termination.stat, "game over, ending already stored");
            state.complete(ending.id, progress_id, now)?;
            None
        }
        (Some(termination), None) => {
            info!(stat = %termination.stat, value = termination.value, "game over, requesting ending");
            state.await_ending(progress_id, now)?;
            Some(ending_task(
                target(ids, &state),
                &story,
                &setup,
                &candidate,
                made_choices,
                termination,
            )?)
        }
        (None, Some(next_scene)) => {
            state.advance_to_scene(next_scene.id, progress_id, now)?;
            None
        }
        (None, None) => {
            state.await_scene(progress_id, now)?;
            Some(scene_task(
                target(ids, &state),
                PromptType::ContinueScene,
                &story,
                &candidate,
                made_choices,
            ))
        }
    };

    uow.save_game_state(&state).await?;
    Ok(Applied {
        state,
        task,
        termination: reported,
    })
}

/// Handles the `StartGame` command: opens a new save slot on the story's
/// initial progress node, requesting the first scene if it does not exist.
///
/// # Errors
///
/// Returns `DomainError::StoryNotFound`, `DomainError::StoryNotPlayable`,
/// `DomainError::SaveSlotLimitReached`, or `DomainError::Dispatch` if the
/// initial scene could not be requested.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        player_id = %command.player_id,
        story_id = %command.story_id,
    )
)]
pub async fn handle_start_game(
    command: &StartGame,
    settings: &EngineSettings,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    store: &dyn GameStore,
    dispatcher: &dyn GenerationDispatcher,
) -> Result<GameOutcome, DomainError> {
    let mut uow = store.begin().await?;
    let result = start_game(&mut *uow, command, settings, clock.now(), ids).await;
    finish(uow, dispatcher, result).await
}

async fn start_game(
    uow: &mut dyn GameUnitOfWork,
    command: &StartGame,
    settings: &EngineSettings,
    now: DateTime<Utc>,
    ids: &dyn IdSource,
) -> Result<Applied, DomainError> {
    let story = uow
        .load_story(command.story_id)
        .await?
        .ok_or(DomainError::StoryNotFound(command.story_id))?;
    story.ensure_playable()?;
    let setup = story.parsed_setup()?;

    let slots = uow
        .list_game_states(command.player_id, command.story_id)
        .await?
        .len();
    if slots >= settings.max_save_slots_per_story {
        return Err(DomainError::SaveSlotLimitReached {
            limit: settings.max_save_slots_per_story,
        });
    }

    let mut initial = PlayerProgress::initial(ids.next_id(), story.id, setup.initial_stats(), now);
    initial.id = uow.upsert_progress(&initial).await?;
    let scene = uow.find_scene(story.id, INITIAL_STATE_HASH).await?;

    let state = PlayerGameState::start(
        ids.next_id(),
        command.player_id,
        story.id,
        initial.id,
        scene.map(|s| s.id),
        now,
    );
    let task = (state.status == GameStatus::GeneratingScene).then(|| {
        scene_task(
            target(ids, &state),
            PromptType::InitialScene,
            &story,
            &initial,
            Vec::new(),
        )
    });

    uow.save_game_state(&state).await?;
    Ok(Applied::new(state, task))
}

/// Handles the `RetryGeneration` command: re-requests the content for the
/// save slot's current progress node without touching the node itself.
///
/// # Errors
///
/// Returns `DomainError::InvalidOperation` unless the slot is in `Error`,
/// `GeneratingScene` or `GameOverPending`,
/// `DomainError::GenerationLimitReached` when the player has too many other
/// generations in flight, or `DomainError::Dispatch`.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        player_id = %command.player_id,
        game_state_id = %command.game_state_id,
        state_hash = field::Empty,
    )
)]
pub async fn handle_retry_generation(
    command: &RetryGeneration,
    settings: &EngineSettings,
    clock: &dyn Clock,
    ids: &dyn IdSource,
    store: &dyn GameStore,
    dispatcher: &dyn GenerationDispatcher,
) -> Result<GameOutcome, DomainError> {
    let mut uow = store.begin().await?;
    let result = retry_generation(&mut *uow, command, settings, clock.now(), ids).await;
    finish(uow, dispatcher, result).await
}

async fn retry_generation(
    uow: &mut dyn GameUnitOfWork,
    command: &RetryGeneration,
    settings: &EngineSettings,
    now: DateTime<Utc>,
    ids: &dyn IdSource,
) -> Result<Applied, DomainError> {
    let mut state = uow
        .lock_game_state(command.game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(command.game_state_id))?;
    state.ensure_owned_by(command.player_id)?;
    if !matches!(
        state.status,
        GameStatus::Error | GameStatus::GeneratingScene | GameStatus::GameOverPending
    ) {
        return Err(DomainError::InvalidOperation(format!(
            "nothing to retry while game state is {}",
            state.status
        )));
    }
    let already_counted = usize::from(state.status.awaits_generation());
    ensure_capacity(
        uow,
        command.player_id,
        settings.generation_limit_per_user,
        already_counted,
    )
    .await?;

    let progress = load_progress(uow, &state).await?;
    Span::current().record("state_hash", field::display(&progress.state_hash));
    let story = load_story(uow, &state).await?;
    let setup = story.parsed_setup()?;
    let termination = if progress.is_initial() {
        None
    } else {
        evaluate_bounds(&progress.core_stats, &setup)
    };
    let existing = uow.find_scene(story.id, &progress.state_hash).await?;

    let task = match (termination, existing) {
        (Some(_), Some(ending)) => {
            state.complete(ending.id, progress.id, now)?;
            None
        }
        (None, Some(scene)) => {
            state.advance_to_scene(scene.id, progress.id, now)?;
            None
        }
        (Some(termination), None) => {
            state.await_ending(progress.id, now)?;
            Some(ending_task(
                target(ids, &state),
                &story,
                &setup,
                &progress,
                Vec::new(),
                termination,
            )?)
        }
        (None, None) => {
            state.await_scene(progress.id, now)?;
            let prompt_type = if progress.is_initial() {
                PromptType::InitialScene
            } else {
                PromptType::ContinueScene
            };
            Some(scene_task(
                target(ids, &state),
                prompt_type,
                &story,
                &progress,
                Vec::new(),
            ))
        }
    };

    uow.save_game_state(&state).await?;
    Ok(Applied::new(state, task))
}

/// Handles the `DeleteGameState` command.
///
/// # Errors
///
/// Returns `DomainError::GameStateNotFound` or `DomainError::Forbidden`.
#[instrument(
    skip_all,
    fields(
        correlation_id = %command.correlation_id,
        player_id = %command.player_id,
        game_state_id = %command.game_state_id,
    )
)]
pub async fn handle_delete_game_state(
    command: &DeleteGameState,
    store: &dyn GameStore,
) -> Result<(), DomainError> {
    let mut uow = store.begin().await?;
    match delete_game_state(&mut *uow, command).await {
        Ok(()) => {
            uow.commit().await?;
            info!("game state deleted");
            Ok(())
        }
        Err(err) => {
            abandon(uow).await;
            log_failure(&err);
            Err(err)
        }
    }
}

async fn delete_game_state(
    uow: &mut dyn GameUnitOfWork,
    command: &DeleteGameState,
) -> Result<(), DomainError> {
    let state = uow
        .lock_game_state(command.game_state_id)
        .await?
        .ok_or(DomainError::GameStateNotFound(command.game_state_id))?;
    state.ensure_owned_by(command.player_id)?;
    if uow.delete_game_state(state.id, command.player_id).await? {
        Ok(())
    } else {
        Err(DomainError::GameStateNotFound(state.id))
    }
}

fn target(ids: &dyn IdSource, state: &PlayerGameState) -> TaskTarget {
    TaskTarget {
        task_id: ids.next_id(),
        player_id: state.player_id,
        game_state_id: state.id,
    }
}

pub(crate) async fn load_progress(
    uow: &mut dyn GameUnitOfWork,
    state: &PlayerGameState,
) -> Result<PlayerProgress, DomainError> {
    uow.load_progress(state.current_progress_id)
        .await?
        .ok_or_else(|| {
            DomainError::Internal(format!(
                "progress {} for game state {} is missing",
                state.current_progress_id, state.id
            ))
        })
}

async fn load_story(
    uow: &mut dyn GameUnitOfWork,
    state: &PlayerGameState,
) -> Result<PublishedStory, DomainError> {
    uow.load_story(state.story_id).await?.ok_or_else(|| {
        DomainError::Internal(format!(
            "story {} for game state {} is missing",
            state.story_id, state.id
        ))
    })
}
