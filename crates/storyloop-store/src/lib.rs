//! Storyloop Store: `PostgreSQL` persistence for the game loop.

pub mod pg_game_store;

use sqlx::migrate::Migrator;

/// Embedded schema migrations from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
