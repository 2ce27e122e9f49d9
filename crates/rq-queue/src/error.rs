//! Queue error types

use rq_store::StoreError;

use crate::dispatch::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed job: {0}")]
    MalformedJob(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The process cannot act as a master or unit (e.g. its own executable
    /// cannot be resolved for re-launching).
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Spawn error: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<config::ConfigError> for QueueError {
    fn from(e: config::ConfigError) -> Self {
        QueueError::Config(e.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
