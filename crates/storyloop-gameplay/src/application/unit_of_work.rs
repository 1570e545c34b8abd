//! Commit discipline for use cases that may hand work to the generation
//! worker.
//!
//! The sequence is always: persist the new state inside the open unit of
//! work, dispatch the task, then commit. A failed dispatch rolls everything
//! back so the player's save slot is exactly as it was and the action can be
//! retried. A task accepted by the worker just before a failed commit is
//! left orphaned.

use storyloop_core::dispatch::{GenerationDispatcher, GenerationTask};
use storyloop_core::error::DomainError;
use storyloop_core::store::GameUnitOfWork;
use tracing::{error, info, warn};

/// Dispatches `task` (if any) and commits; rolls back if dispatch fails.
pub(crate) async fn commit_after_dispatch(
    uow: Box<dyn GameUnitOfWork>,
    dispatcher: &dyn GenerationDispatcher,
    task: Option<&GenerationTask>,
) -> Result<(), DomainError> {
    if let Some(task) = task {
        let dispatched = if task.is_ending() {
            dispatcher.dispatch_ending(task).await
        } else {
            dispatcher.dispatch_generation(task).await
        };
        if let Err(err) = dispatched {
            error!(
                task_id = %task.task_id,
                prompt_type = %task.prompt_type,
                state_hash = %task.state_hash,
                error = %err,
                "generation dispatch failed, rolling back"
            );
            abandon(uow).await;
            return Err(err);
        }
        info!(
            task_id = %task.task_id,
            prompt_type = %task.prompt_type,
            "generation task dispatched"
        );
    }
    uow.commit().await
}

/// Rolls back after a failed use case. The original failure is what the
/// caller needs, so a rollback error is only logged.
pub(crate) async fn abandon(uow: Box<dyn GameUnitOfWork>) {
    if let Err(err) = uow.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

/// Logs a use-case failure at a severity matching its category.
pub(crate) fn log_failure(err: &DomainError) {
    if err.is_expected() {
        info!(error = %err, "command rejected");
    } else {
        error!(error = %err, "command failed");
    }
}
