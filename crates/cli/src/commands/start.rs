use crate::commands::{block_on, load_config, CommandResult};
use dialroute_agent::client_from_config;
use dialroute_core::domain::conversation::OrganizationId;
use dialroute_core::sources::RoutingConfigSource;
use dialroute_db::{connect_with_config, migrations, RoutingSeedDataset, SqlRoutingConfigRepository};
use serde_json::json;

/// Preflight for `dialroute-server`: everything bootstrap does, without binding a port.
pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        let timezone = config
            .business_hours
            .timezone()
            .map_err(|error| ("config_validation", error.to_string(), 2u8))?;
        client_from_config(&config.llm)
            .map_err(|error| ("model_config", error.to_string(), 6u8))?;

        block_on(async move {
            let pool = connect_with_config(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let repo = SqlRoutingConfigRepository::new(pool.clone());
            let demo = OrganizationId(RoutingSeedDataset::ORGANIZATION_ID);
            let rules = repo
                .get_configs(&demo, &config.routing.domain)
                .await
                .map_err(|error| ("routing_rules", error.to_string(), 7u8))?;
            pool.close().await;

            Ok(json!({
                "domain": config.routing.domain,
                "timezone": timezone.name(),
                "llm_enabled": config.llm.enabled,
                "llm_provider": config.llm.provider.as_str(),
                "demo_rules": rules.len(),
                "bind": format!("{}:{}", config.server.bind_address, config.server.port),
            }))
        })
    });

    match result {
        Ok(data) => CommandResult::success_with_data("start", "startup preflight passed", Some(data)),
        Err(error) => CommandResult::from_step("start", error),
    }
}
