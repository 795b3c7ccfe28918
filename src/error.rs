use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Worker thread spawn failed: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedError>;
