//! `PostgreSQL` implementation of the `GameStore` port.
//!
//! Each unit of work wraps one `sqlx` transaction. Progress nodes and scenes
//! are inserted with `ON CONFLICT (story_id, state_hash) DO NOTHING` and
//! resolve to the stored row when another transaction got there first.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use storyloop_core::error::DomainError;
use storyloop_core::game_state::PlayerGameState;
use storyloop_core::progress::PlayerProgress;
use storyloop_core::scene::StoryScene;
use storyloop_core::store::{GameStore, GameUnitOfWork};
use storyloop_core::story::PublishedStory;

const SELECT_GAME_STATE: &str = r"
SELECT id, player_id, story_id, status, current_scene_id, current_progress_id,
       error_details, started_at, last_activity_at, completed_at
FROM player_game_states";

const SELECT_PROGRESS: &str = r"
SELECT id, story_id, core_stats, story_variables, global_flags, state_hash,
       scene_index, encountered_characters, last_story_summary,
       last_future_direction, last_var_impact_summary, created_at
FROM player_progress";

const SELECT_SCENE: &str = r"
SELECT id, story_id, state_hash, content, created_at
FROM story_scenes";

const PENDING_STATUSES: &str = "('generating_scene', 'game_over_pending')";

/// PostgreSQL-backed game store.
#[derive(Debug, Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    /// Creates a new `PgGameStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn begin(&self) -> Result<Box<dyn GameUnitOfWork>, DomainError> {
        let tx = self.pool.begin().await.map_err(infrastructure)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    async fn fetch_game_state(
        &mut self,
        id: Uuid,
        lock: bool,
    ) -> Result<Option<PlayerGameState>, DomainError> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql = format!("{SELECT_GAME_STATE} WHERE id = $1{suffix}");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .as_ref()
            .map(game_state_from_row)
            .transpose()
    }
}

#[async_trait]
impl GameUnitOfWork for PgUnitOfWork {
    async fn lock_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError> {
        self.fetch_game_state(id, true).await
    }

    async fn load_game_state(&mut self, id: Uuid) -> Result<Option<PlayerGameState>, DomainError> {
        self.fetch_game_state(id, false).await
    }

    async fn load_progress(&mut self, id: Uuid) -> Result<Option<PlayerProgress>, DomainError> {
        let sql = format!("{SELECT_PROGRESS} WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .as_ref()
            .map(progress_from_row)
            .transpose()
    }

    async fn load_scene(&mut self, id: Uuid) -> Result<Option<StoryScene>, DomainError> {
        let sql = format!("{SELECT_SCENE} WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .as_ref()
            .map(scene_from_row)
            .transpose()
    }

    async fn load_story(&mut self, id: Uuid) -> Result<Option<PublishedStory>, DomainError> {
        sqlx::query(
            r"
            SELECT id, author_id, status, config, setup, language
            FROM published_stories
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(infrastructure)?
        .as_ref()
        .map(story_from_row)
        .transpose()
    }

    async fn find_scene(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<StoryScene>, DomainError> {
        let sql = format!("{SELECT_SCENE} WHERE story_id = $1 AND state_hash = $2");
        sqlx::query(&sql)
            .bind(story_id)
            .bind(state_hash)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .as_ref()
            .map(scene_from_row)
            .transpose()
    }

    async fn find_progress(
        &mut self,
        story_id: Uuid,
        state_hash: &str,
    ) -> Result<Option<PlayerProgress>, DomainError> {
        let sql = format!("{SELECT_PROGRESS} WHERE story_id = $1 AND state_hash = $2");
        sqlx::query(&sql)
            .bind(story_id)
            .bind(state_hash)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .as_ref()
            .map(progress_from_row)
            .transpose()
    }

    async fn upsert_progress(&mut self, candidate: &PlayerProgress) -> Result<Uuid, DomainError> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r"
            INSERT INTO player_progress (
                id, story_id, core_stats, story_variables, global_flags, state_hash,
                scene_index, encountered_characters, last_story_summary,
                last_future_direction, last_var_impact_summary, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (story_id, state_hash) DO NOTHING
            RETURNING id
            ",
        )
        .bind(candidate.id)
        .bind(candidate.story_id)
        .bind(Json(&candidate.core_stats))
        .bind(Json(&candidate.story_variables))
        .bind(Json(&candidate.global_flags))
        .bind(&candidate.state_hash)
        .bind(candidate.scene_index)
        .bind(Json(&candidate.encountered_characters))
        .bind(candidate.last_story_summary.as_deref())
        .bind(candidate.last_future_direction.as_deref())
        .bind(candidate.last_var_impact_summary.as_deref())
        .bind(candidate.created_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(infrastructure)?;

        if let Some(id) = inserted {
            return Ok(id);
        }
        debug!(state_hash = %candidate.state_hash, "progress node already stored");
        sqlx::query_scalar("SELECT id FROM player_progress WHERE story_id = $1 AND state_hash = $2")
            .bind(candidate.story_id)
            .bind(&candidate.state_hash)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(infrastructure)
    }

    async fn insert_scene_if_absent(&mut self, scene: &StoryScene) -> Result<Uuid, DomainError> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r"
            INSERT INTO story_scenes (id, story_id, state_hash, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (story_id, state_hash) DO NOTHING
            RETURNING id
            ",
        )
        .bind(scene.id)
        .bind(scene.story_id)
        .bind(&scene.state_hash)
        .bind(&scene.content)
        .bind(scene.created_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(infrastructure)?;

        if let Some(id) = inserted {
            return Ok(id);
        }
        debug!(state_hash = %scene.state_hash, "scene already stored, keeping the first");
        sqlx::query_scalar("SELECT id FROM story_scenes WHERE story_id = $1 AND state_hash = $2")
            .bind(scene.story_id)
            .bind(&scene.state_hash)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(infrastructure)
    }

    async fn save_game_state(&mut self, state: &PlayerGameState) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO player_game_states (
                id, player_id, story_id, status, current_scene_id, current_progress_id,
                error_details, started_at, last_activity_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                current_scene_id = EXCLUDED.current_scene_id,
                current_progress_id = EXCLUDED.current_progress_id,
                error_details = EXCLUDED.error_details,
                last_activity_at = EXCLUDED.last_activity_at,
                completed_at = EXCLUDED.completed_at
            ",
        )
        .bind(state.id)
        .bind(state.player_id)
        .bind(state.story_id)
        .bind(state.status.as_str())
        .bind(state.current_scene_id)
        .bind(state.current_progress_id)
        .bind(state.error_details.as_deref())
        .bind(state.started_at)
        .bind(state.last_activity_at)
        .bind(state.completed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn list_game_states(
        &mut self,
        player_id: Uuid,
        story_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        let sql = format!(
            "{SELECT_GAME_STATE} WHERE player_id = $1 AND story_id = $2 \
             ORDER BY last_activity_at DESC, id"
        );
        sqlx::query(&sql)
            .bind(player_id)
            .bind(story_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .iter()
            .map(game_state_from_row)
            .collect()
    }

    async fn list_pending_for_progress(
        &mut self,
        progress_id: Uuid,
    ) -> Result<Vec<PlayerGameState>, DomainError> {
        let sql = format!(
            "{SELECT_GAME_STATE} WHERE current_progress_id = $1 \
             AND status IN {PENDING_STATUSES} ORDER BY id FOR UPDATE"
        );
        sqlx::query(&sql)
            .bind(progress_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(infrastructure)?
            .iter()
            .map(game_state_from_row)
            .collect()
    }

    async fn delete_game_state(&mut self, id: Uuid, player_id: Uuid) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM player_game_states WHERE id = $1 AND player_id = $2")
            .bind(id)
            .bind(player_id)
            .execute(&mut *self.tx)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_active_generations(&mut self, player_id: Uuid) -> Result<i64, DomainError> {
        let sql = format!(
            "SELECT COUNT(*) FROM player_game_states \
             WHERE player_id = $1 AND status IN {PENDING_STATUSES}"
        );
        sqlx::query_scalar(&sql)
            .bind(player_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(infrastructure)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(infrastructure)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback().await.map_err(infrastructure)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(infrastructure)
}

fn game_state_from_row(row: &PgRow) -> Result<PlayerGameState, DomainError> {
    let status: String = column(row, "status")?;
    Ok(PlayerGameState {
        id: column(row, "id")?,
        player_id: column(row, "player_id")?,
        story_id: column(row, "story_id")?,
        status: status.parse()?,
        current_scene_id: column(row, "current_scene_id")?,
        current_progress_id: column(row, "current_progress_id")?,
        error_details: column(row, "error_details")?,
        started_at: column(row, "started_at")?,
        last_activity_at: column(row, "last_activity_at")?,
        completed_at: column(row, "completed_at")?,
    })
}

fn progress_from_row(row: &PgRow) -> Result<PlayerProgress, DomainError> {
    let Json(core_stats): Json<BTreeMap<String, i64>> = column(row, "core_stats")?;
    let Json(story_variables): Json<BTreeMap<String, Value>> = column(row, "story_variables")?;
    let Json(global_flags): Json<BTreeSet<String>> = column(row, "global_flags")?;
    let Json(encountered_characters): Json<Vec<String>> = column(row, "encountered_characters")?;
    Ok(PlayerProgress {
        id: column(row, "id")?,
        story_id: column(row, "story_id")?,
        core_stats,
        story_variables,
        global_flags,
        state_hash: column(row, "state_hash")?,
        scene_index: column(row, "scene_index")?,
        encountered_characters,
        last_story_summary: column(row, "last_story_summary")?,
        last_future_direction: column(row, "last_future_direction")?,
        last_var_impact_summary: column(row, "last_var_impact_summary")?,
        created_at: column(row, "created_at")?,
    })
}

fn scene_from_row(row: &PgRow) -> Result<StoryScene, DomainError> {
    Ok(StoryScene {
        id: column(row, "id")?,
        story_id: column(row, "story_id")?,
        state_hash: column(row, "state_hash")?,
        content: column(row, "content")?,
        created_at: column(row, "created_at")?,
    })
}

fn story_from_row(row: &PgRow) -> Result<PublishedStory, DomainError> {
    let status: String = column(row, "status")?;
    Ok(PublishedStory {
        id: column(row, "id")?,
        author_id: column(row, "author_id")?,
        status: status.parse()?,
        config: column(row, "config")?,
        setup: column(row, "setup")?,
        language: column(row, "language")?,
    })
}
