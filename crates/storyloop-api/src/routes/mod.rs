//! Route modules: player-facing game routes, worker callbacks and health.

pub mod game;
pub mod health;
pub mod internal;
pub mod player;
