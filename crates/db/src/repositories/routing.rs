use async_trait::async_trait;
use dialroute_core::domain::conversation::OrganizationId;
use dialroute_core::domain::routing::{
    AwaitingTypeConfig, RoutingConfig, RoutingConfigKind, RoutingConfigSet,
};
use dialroute_core::errors::SourceError;
use dialroute_core::sources::RoutingConfigSource;
use serde_json::{Map, Value};
use sqlx::Row;
use tracing::warn;

use super::{decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlRoutingConfigRepository {
    pool: DbPool,
}

impl SqlRoutingConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, config_type, trigger_value, target_intent, target_node, priority,
                    requires_auth, clears_context, metadata_json, display_name
             FROM routing_config
             WHERE organization_id = ? AND domain = ? AND is_active = 1
             ORDER BY priority ASC, id ASC",
        )
        .bind(organization_db_id(organization_id)?)
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(config) = row_to_config(row)? {
                configs.push(config);
            }
        }
        Ok(RoutingConfigSet::new(configs))
    }

    pub async fn load_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT awaiting_type, target_node, valid_response_intents_json, validation_pattern, priority
             FROM awaiting_type_config
             WHERE awaiting_type = ? AND is_active = 1",
        )
        .bind(awaiting_type.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_awaiting(r)?)),
            None => Ok(None),
        }
    }

    pub async fn save(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
        config: &RoutingConfig,
    ) -> Result<(), RepositoryError> {
        let metadata = Value::Object(config.metadata.clone()).to_string();

        sqlx::query(
            "INSERT INTO routing_config (organization_id, domain, config_type, trigger_value,
                                         target_intent, target_node, priority, requires_auth,
                                         clears_context, metadata_json, display_name, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
             ON CONFLICT(organization_id, domain, config_type, trigger_value, target_intent)
             DO UPDATE SET
                 target_node = excluded.target_node,
                 priority = excluded.priority,
                 requires_auth = excluded.requires_auth,
                 clears_context = excluded.clears_context,
                 metadata_json = excluded.metadata_json,
                 display_name = excluded.display_name,
                 is_active = 1",
        )
        .bind(organization_db_id(organization_id)?)
        .bind(domain)
        .bind(config.kind.as_str())
        .bind(&config.trigger_value)
        .bind(&config.target_intent)
        .bind(&config.target_node)
        .bind(config.priority)
        .bind(config.requires_auth)
        .bind(config.clears_context)
        .bind(metadata)
        .bind(&config.display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn save_awaiting(&self, config: &AwaitingTypeConfig) -> Result<(), RepositoryError> {
        let intents = serde_json::to_string(&config.valid_response_intents)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO awaiting_type_config (awaiting_type, target_node, valid_response_intents_json,
                                               validation_pattern, priority, is_active)
             VALUES (?, ?, ?, ?, ?, 1)
             ON CONFLICT(awaiting_type) DO UPDATE SET
                 target_node = excluded.target_node,
                 valid_response_intents_json = excluded.valid_response_intents_json,
                 validation_pattern = excluded.validation_pattern,
                 priority = excluded.priority,
                 is_active = 1",
        )
        .bind(config.awaiting_type.trim())
        .bind(&config.target_node)
        .bind(intents)
        .bind(&config.validation_pattern)
        .bind(config.priority)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RoutingConfigSource for SqlRoutingConfigRepository {
    async fn get_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, SourceError> {
        Ok(self.load_configs(organization_id, domain).await?)
    }

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError> {
        Ok(self.load_awaiting_config(awaiting_type).await?)
    }
}

fn organization_db_id(organization_id: &OrganizationId) -> Result<i64, RepositoryError> {
    i64::try_from(organization_id.0).map_err(|_| {
        RepositoryError::Decode(format!("organization id {organization_id} out of range"))
    })
}

/// Rows with an unknown `config_type` are skipped; unreadable metadata becomes empty.
fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<Option<RoutingConfig>, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let config_type: String = row.try_get("config_type").map_err(decode_error)?;
    let Some(kind) = RoutingConfigKind::parse(&config_type) else {
        warn!(
            event_name = "routing.config.unknown_kind",
            row_id = id,
            config_type = %config_type,
            "skipping routing_config row with unknown config_type"
        );
        return Ok(None);
    };

    let trigger_value: String = row.try_get("trigger_value").map_err(decode_error)?;
    let target_intent: String = row.try_get("target_intent").map_err(decode_error)?;
    let target_node: Option<String> = row.try_get("target_node").map_err(decode_error)?;
    let priority: i64 = row.try_get("priority").map_err(decode_error)?;
    let requires_auth: bool = row.try_get("requires_auth").map_err(decode_error)?;
    let clears_context: bool = row.try_get("clears_context").map_err(decode_error)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_error)?;
    let display_name: Option<String> = row.try_get("display_name").map_err(decode_error)?;

    let metadata = match serde_json::from_str::<Value>(&metadata_json) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(
                event_name = "routing.config.invalid_metadata",
                row_id = id,
                "routing_config metadata is not a JSON object; ignoring it"
            );
            Map::new()
        }
    };

    Ok(Some(RoutingConfig {
        kind,
        trigger_value,
        target_intent,
        target_node: target_node.filter(|node| !node.trim().is_empty()),
        priority: i32::try_from(priority).unwrap_or(if priority < 0 { i32::MIN } else { i32::MAX }),
        requires_auth,
        clears_context,
        metadata,
        display_name,
    }))
}

fn row_to_awaiting(row: &sqlx::sqlite::SqliteRow) -> Result<AwaitingTypeConfig, RepositoryError> {
    let awaiting_type: String = row.try_get("awaiting_type").map_err(decode_error)?;
    let target_node: String = row.try_get("target_node").map_err(decode_error)?;
    let intents_json: String = row.try_get("valid_response_intents_json").map_err(decode_error)?;
    let validation_pattern: Option<String> =
        row.try_get("validation_pattern").map_err(decode_error)?;
    let priority: i64 = row.try_get("priority").map_err(decode_error)?;

    let valid_response_intents =
        serde_json::from_str::<Vec<String>>(&intents_json).unwrap_or_else(|error| {
            warn!(
                event_name = "routing.config.invalid_response_intents",
                awaiting_type = %awaiting_type,
                error = %error,
                "valid_response_intents_json is not a string list; ignoring it"
            );
            Vec::new()
        });

    Ok(AwaitingTypeConfig {
        awaiting_type,
        target_node,
        valid_response_intents,
        validation_pattern: validation_pattern.filter(|pattern| !pattern.trim().is_empty()),
        priority: i32::try_from(priority).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use dialroute_core::domain::conversation::OrganizationId;
    use dialroute_core::domain::routing::{AwaitingTypeConfig, RoutingConfig, RoutingConfigKind};
    use dialroute_core::sources::RoutingConfigSource;
    use serde_json::json;

    use super::SqlRoutingConfigRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlRoutingConfigRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRoutingConfigRepository::new(pool)
    }

    #[tokio::test]
    async fn configs_round_trip_grouped_and_ordered() {
        let repo = repository().await;
        let org = OrganizationId(3);
        for config in [
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "menu", "show_menu")
                .with_node("main_menu")
                .with_priority(20)
                .with_metadata("aliases", json!(["inicio"])),
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "salir", "cancel").with_priority(5),
            RoutingConfig::new(RoutingConfigKind::IntentNodeMapping, "", "debt_query")
                .with_node("debt_manager")
                .requiring_auth(),
        ] {
            repo.save(&org, "collections", &config).await.expect("save");
        }
        repo.save(&OrganizationId(4), "collections", &RoutingConfig::new(RoutingConfigKind::MenuOption, "1", "debt_query"))
            .await
            .expect("save other org");

        let set = repo.get_configs(&org, "collections").await.expect("load");
        assert_eq!(set.len(), 3);
        let keywords = set.of_kind(RoutingConfigKind::GlobalKeyword);
        assert_eq!(keywords[0].trigger_value, "salir");
        assert_eq!(keywords[1].aliases(), vec!["inicio".to_string()]);
        assert!(set.of_kind(RoutingConfigKind::IntentNodeMapping)[0].requires_auth);
        assert!(set.of_kind(RoutingConfigKind::MenuOption).is_empty());
    }

    #[tokio::test]
    async fn unknown_kinds_and_bad_metadata_degrade_gracefully() {
        let repo = repository().await;
        sqlx::query(
            "INSERT INTO routing_config (organization_id, domain, config_type, trigger_value, target_intent, metadata_json)
             VALUES (9, 'collections', 'carousel', 'x', 'greeting', '{}'),
                    (9, 'collections', 'global_keyword', 'hola', 'greeting', 'not json')",
        )
        .execute(&repo.pool)
        .await
        .expect("insert raw rows");

        let set = repo.get_configs(&OrganizationId(9), "collections").await.expect("load");
        assert_eq!(set.len(), 1);
        assert!(set.of_kind(RoutingConfigKind::GlobalKeyword)[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn awaiting_configs_round_trip() {
        let repo = repository().await;
        let config = AwaitingTypeConfig {
            awaiting_type: "confirmation".to_string(),
            target_node: "confirmation_handler".to_string(),
            valid_response_intents: vec!["confirm".to_string(), "reject".to_string()],
            validation_pattern: None,
            priority: 1,
        };
        repo.save_awaiting(&config).await.expect("save");

        assert_eq!(repo.get_awaiting_config("confirmation").await.expect("load"), Some(config));
        assert_eq!(repo.get_awaiting_config("dni").await.expect("load"), None);
    }
}
