//! Application layer: use-case handlers over the store and dispatcher ports.

pub mod admission;
pub mod command_handlers;
pub mod generation_results;
pub mod query_handlers;
mod settings;
mod task_builder;
mod unit_of_work;

#[cfg(test)]
mod fixtures;

pub use settings::EngineSettings;
