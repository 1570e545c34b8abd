//! Shared test doubles for the Storyloop game loop engine.

mod clock;
mod dispatcher;
mod ids;
mod store;

pub use clock::FixedClock;
pub use dispatcher::{FailingDispatcher, RecordingDispatcher};
pub use ids::SequentialIds;
pub use store::{FailingGameStore, InMemoryGameStore};
