//! Recording and failing `GenerationDispatcher` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use storyloop_core::dispatch::{GenerationDispatcher, GenerationTask};
use storyloop_core::error::DomainError;

/// A dispatcher that accepts and records every task.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    generation: Mutex<Vec<GenerationTask>>,
    endings: Mutex<Vec<GenerationTask>>,
}

impl RecordingDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks passed to `dispatch_generation`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn generation_tasks(&self) -> Vec<GenerationTask> {
        self.generation.lock().unwrap().clone()
    }

    /// Tasks passed to `dispatch_ending`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn ending_tasks(&self) -> Vec<GenerationTask> {
        self.endings.lock().unwrap().clone()
    }

    /// Total number of dispatched tasks.
    pub fn dispatched_count(&self) -> usize {
        self.generation_tasks().len() + self.ending_tasks().len()
    }
}

#[async_trait]
impl GenerationDispatcher for RecordingDispatcher {
    async fn dispatch_generation(&self, task: &GenerationTask) -> Result<(), DomainError> {
        self.generation.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn dispatch_ending(&self, task: &GenerationTask) -> Result<(), DomainError> {
        self.endings.lock().unwrap().push(task.clone());
        Ok(())
    }
}

/// A dispatcher whose broker is always unavailable.
#[derive(Debug)]
pub struct FailingDispatcher;

#[async_trait]
impl GenerationDispatcher for FailingDispatcher {
    async fn dispatch_generation(&self, _task: &GenerationTask) -> Result<(), DomainError> {
        Err(DomainError::Dispatch("broker unavailable".into()))
    }

    async fn dispatch_ending(&self, _task: &GenerationTask) -> Result<(), DomainError> {
        Err(DomainError::Dispatch("broker unavailable".into()))
    }
}
