//! Storyloop Core: shared domain model and ports.
//!
//! This crate defines the data model shared by every part of the game loop
//! (stories, progress nodes, scenes, player game states) together with the
//! traits the engine consumes from its collaborators: the transactional
//! store and the generation dispatcher. It contains no infrastructure code.

pub mod command;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod game_state;
pub mod progress;
pub mod scene;
pub mod store;
pub mod story;
