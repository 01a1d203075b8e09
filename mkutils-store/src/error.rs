use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not initialized")]
    NotInitialized,

    #[error("store configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out")]
    Timeout,

    #[error("store is unavailable")]
    Unavailable,

    #[error("no pooled connection became available in time")]
    PoolExhausted,

    #[error("key '{key}' holds a value of the wrong type")]
    WrongType { key: String },

    #[error("increment of '{key}' would overflow")]
    Overflow { key: String },

    #[error("value '{value}' stored at '{key}' could not be parsed")]
    Parse { key: String, value: String },

    #[error("list item '{0}' contains the reserved ';' separator")]
    InvalidListItem(String),
}

impl StoreError {
    /// Whether the failure came from the store round trip rather than from the caller.
    /// Transient errors can be retried; the rest will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Redis(_) | StoreError::Timeout | StoreError::Unavailable | StoreError::PoolExhausted
        )
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("redis is disabled in the connection config")]
    Disabled,

    #[error("invalid connection config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
