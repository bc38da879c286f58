use thiserror::Error;

/// Error returned when the owning context refuses a task.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("[dispatch] the owning context no longer accepts tasks")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("[spawn] could not start the owning thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("[run] {0}")]
    Dispatch(#[from] DispatchError),
    #[error("[run] the task was dropped before it could run")]
    Abandoned,
    #[error("[shutdown] the owning thread panicked")]
    Join,
}
