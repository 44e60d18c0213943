use dialroute_core::errors::{SourceError, StoreError};
use thiserror::Error;

pub mod counter;
pub mod memory;
pub mod routing;
pub mod schedule;

pub use counter::SqlCounterStore;
pub use memory::{InMemoryRoutingConfigSource, InMemoryScheduleSource};
pub use routing::SqlRoutingConfigRepository;
pub use schedule::SqlScheduleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for SourceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Malformed(message),
        }
    }
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Malformed(message),
        }
    }
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
