//! Storyloop Gameplay: the game loop engine.
//!
//! Turns a player's choice into the next narrative state: applies the
//! chosen options' consequences, fingerprints the result, reuses a stored
//! scene for that fingerprint when one exists and otherwise asks the
//! generation worker for one, all inside a single unit of work.

pub mod application;
pub mod domain;
