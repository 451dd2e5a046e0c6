use database::DbError;
use executor::ExecutorError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Task queue is full ({0} jobs waiting)")]
    QueueFull(usize),

    #[error("Task queue is closed")]
    Closed,

    #[error("Calculation {0} is already queued")]
    AlreadyQueued(Uuid),

    #[error("Worker stopped before reporting on calculation {0}")]
    WorkerLost(Uuid),

    #[error("Failed to list pending calculations: {0}")]
    Store(#[from] DbError),
}

/// Why a single attempt did not produce an outcome.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl AttemptError {
    pub fn is_transient(&self) -> bool {
        match self {
            AttemptError::Executor(e) => e.is_transient(),
            AttemptError::TimedOut(_) => true,
        }
    }
}
