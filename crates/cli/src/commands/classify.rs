use std::sync::Arc;

use crate::commands::{block_on, CommandResult};
use dialroute_agent::{DisabledLlmClient, IntentRouteResolver};
use dialroute_core::config::RoutingSettings;
use dialroute_core::domain::conversation::ConversationState;
use dialroute_core::sources::RoutingConfigSource;
use dialroute_db::{
    connect_with_settings, migrations, RoutingSeedDataset, SqlRoutingConfigRepository,
};

/// Routes `message` against the demo dataset in a throwaway in-memory database.
/// The model is disabled, so the result is always the deterministic one.
pub fn run(message: &str, authenticated: bool, awaiting: Option<String>) -> CommandResult {
    let state = ConversationState {
        awaiting,
        is_authenticated: authenticated,
        organization_id: Some(RoutingSeedDataset::ORGANIZATION_ID.to_string()),
        ..ConversationState::default()
    };

    let result = block_on(async move {
        let pool = connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        RoutingSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let source: Arc<dyn RoutingConfigSource> =
            Arc::new(SqlRoutingConfigRepository::new(pool.clone()));
        let settings =
            RoutingSettings { domain: RoutingSeedDataset::DOMAIN.to_string(), ..RoutingSettings::default() };
        let resolver = IntentRouteResolver::from_settings(settings, source, Arc::new(DisabledLlmClient));
        let decision = resolver.route(message, &state).await;
        pool.close().await;

        serde_json::to_value(&decision)
            .map_err(|error| ("serialization", error.to_string(), 8u8))
    });

    match result {
        Ok(decision) => {
            let summary = format!(
                "{} -> {}",
                decision["intent"].as_str().unwrap_or("unknown"),
                decision["next_node"].as_str().unwrap_or("unknown")
            );
            CommandResult::success_with_data("classify", summary, Some(decision))
        }
        Err(error) => CommandResult::from_step("classify", error),
    }
}
