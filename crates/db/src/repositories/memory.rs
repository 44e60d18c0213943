use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use dialroute_core::availability::ScheduleRecord;
use dialroute_core::domain::conversation::OrganizationId;
use dialroute_core::domain::routing::{AwaitingTypeConfig, RoutingConfig, RoutingConfigSet};
use dialroute_core::errors::SourceError;
use dialroute_core::sources::{RoutingConfigSource, ScheduleSource};

/// Routing rules held in process, keyed by organization and domain.
#[derive(Default)]
pub struct InMemoryRoutingConfigSource {
    configs: RwLock<HashMap<(u64, String), Vec<RoutingConfig>>>,
    awaiting: RwLock<HashMap<String, AwaitingTypeConfig>>,
}

impl InMemoryRoutingConfigSource {
    pub async fn insert(&self, organization_id: OrganizationId, domain: &str, config: RoutingConfig) {
        let mut configs = self.configs.write().await;
        configs.entry((organization_id.0, domain.to_string())).or_default().push(config);
    }

    pub async fn replace(
        &self,
        organization_id: OrganizationId,
        domain: &str,
        entries: Vec<RoutingConfig>,
    ) {
        let mut configs = self.configs.write().await;
        configs.insert((organization_id.0, domain.to_string()), entries);
    }

    pub async fn insert_awaiting(&self, config: AwaitingTypeConfig) {
        let mut awaiting = self.awaiting.write().await;
        awaiting.insert(config.awaiting_type.clone(), config);
    }
}

#[async_trait]
impl RoutingConfigSource for InMemoryRoutingConfigSource {
    async fn get_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, SourceError> {
        let configs = self.configs.read().await;
        let entries =
            configs.get(&(organization_id.0, domain.to_string())).cloned().unwrap_or_default();
        Ok(RoutingConfigSet::new(entries))
    }

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError> {
        let awaiting = self.awaiting.read().await;
        Ok(awaiting.get(awaiting_type.trim()).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleSource {
    schedules: RwLock<HashMap<String, ScheduleRecord>>,
}

impl InMemoryScheduleSource {
    pub async fn insert(&self, entity_id: &str, record: ScheduleRecord) {
        let mut schedules = self.schedules.write().await;
        schedules.insert(entity_id.to_string(), record);
    }
}

#[async_trait]
impl ScheduleSource for InMemoryScheduleSource {
    async fn get_schedule(&self, entity_id: &str) -> Result<Option<ScheduleRecord>, SourceError> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(entity_id.trim()).cloned())
    }
}
