//! Domain layer for the game loop.

pub mod commands;
pub mod consequences;
pub mod fingerprint;
pub mod scene_content;
