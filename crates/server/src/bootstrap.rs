use std::sync::Arc;
use std::time::Duration;

use dialroute_agent::{client_from_config, EntryGuard, IntentRouteResolver, RoutingRuntime};
use dialroute_core::availability::BusinessHoursEvaluator;
use dialroute_core::config::{AppConfig, ConfigError};
use dialroute_core::errors::ModelError;
use dialroute_core::ratelimit::{spawn_purge_task, RateLimiter};
use dialroute_core::sources::RoutingConfigSource;
use dialroute_db::{
    connect_with_config, migrations, DbPool, SqlCounterStore, SqlRoutingConfigRepository,
    SqlScheduleRepository,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

/// Routing runtime backed entirely by the SQLite repositories.
pub type SqlRoutingRuntime = RoutingRuntime<SqlCounterStore, SqlScheduleRepository>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<SqlRoutingRuntime>,
    /// Expired rate-limit counter sweeper; `None` when disabled in config.
    pub counter_sweeper: Option<JoinHandle<()>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client initialization failed: {0}")]
    Model(#[source] ModelError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        domain = %config.routing.domain,
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = client_from_config(&config.llm).map_err(BootstrapError::Model)?;
    let source: Arc<dyn RoutingConfigSource> =
        Arc::new(SqlRoutingConfigRepository::new(db_pool.clone()));
    let resolver = IntentRouteResolver::from_settings(config.routing.clone(), source, llm);

    let counters = SqlCounterStore::new(db_pool.clone());
    let counter_sweeper = (config.rate_limit.purge_interval_secs > 0).then(|| {
        spawn_purge_task(
            counters.clone(),
            Duration::from_secs(config.rate_limit.purge_interval_secs),
        )
    });

    let guard = EntryGuard::new(
        RateLimiter::new(counters, config.rate_limit),
        BusinessHoursEvaluator::new(
            SqlScheduleRepository::new(db_pool.clone(), config.business_hours.default_enabled),
            config.business_hours.timezone()?,
            config.business_hours.lookup_timeout(),
        ),
    );

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_enabled = config.llm.enabled,
        llm_provider = config.llm.provider.as_str(),
        counter_sweep_secs = config.rate_limit.purge_interval_secs,
        "routing runtime assembled"
    );

    Ok(Application {
        config,
        db_pool,
        runtime: Arc::new(RoutingRuntime::new(guard, resolver)),
        counter_sweeper,
    })
}
