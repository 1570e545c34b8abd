//! Admission control for generation requests.
//!
//! Caps the generations a player may have in flight. The count is a plain
//! query over game states awaiting generation.

use storyloop_core::error::DomainError;
use storyloop_core::store::{GameStore, GameUnitOfWork};
use tracing::instrument;
use uuid::Uuid;

use super::settings::EngineSettings;
use super::unit_of_work::abandon;

/// A player's generation headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Generations currently in flight.
    pub active: usize,
    /// Configured maximum.
    pub limit: usize,
}

/// Checks whether `player_id` may start another generation.
///
/// # Errors
///
/// Returns `DomainError::GenerationLimitReached` when the player is at the
/// limit, or `DomainError` if the store fails.
#[instrument(skip_all, fields(player_id = %player_id))]
pub async fn check_generation_admission(
    player_id: Uuid,
    settings: &EngineSettings,
    store: &dyn GameStore,
) -> Result<Admission, DomainError> {
    let mut uow = store.begin().await?;
    let result = ensure_capacity(&mut *uow, player_id, settings.generation_limit_per_user, 0).await;
    abandon(uow).await;
    result
}

/// Fails if `player_id` has reached `limit` generations, ignoring `exclude`
/// of them (the game state being retried is already counted).
pub(crate) async fn ensure_capacity(
    uow: &mut dyn GameUnitOfWork,
    player_id: Uuid,
    limit: usize,
    exclude: usize,
) -> Result<Admission, DomainError> {
    let counted = uow.count_active_generations(player_id).await?;
    let active = usize::try_from(counted)
        .map_err(|_| DomainError::Internal(format!("negative generation count: {counted}")))?
        .saturating_sub(exclude);
    if active >= limit {
        return Err(DomainError::GenerationLimitReached { active, limit });
    }
    Ok(Admission { active, limit })
}
