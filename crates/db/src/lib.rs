pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{RoutingSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryRoutingConfigSource, InMemoryScheduleSource, RepositoryError, SqlCounterStore,
    SqlRoutingConfigRepository, SqlScheduleRepository,
};
