//! Collaborator contracts for routing rules and service schedules.
//!
//! Implementations live in `dialroute-db` (SQLite and in-memory). The engine
//! only sees these traits and treats every `Err` as degraded-but-recoverable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

use crate::availability::ScheduleRecord;
use crate::domain::conversation::OrganizationId;
use crate::domain::routing::{AwaitingTypeConfig, RoutingConfigSet};
use crate::errors::SourceError;

#[async_trait]
pub trait RoutingConfigSource: Send + Sync {
    async fn get_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, SourceError>;

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError>;
}

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn get_schedule(&self, entity_id: &str) -> Result<Option<ScheduleRecord>, SourceError>;
}

#[async_trait]
impl<T> RoutingConfigSource for Arc<T>
where
    T: RoutingConfigSource + ?Sized,
{
    async fn get_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, SourceError> {
        (**self).get_configs(organization_id, domain).await
    }

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError> {
        (**self).get_awaiting_config(awaiting_type).await
    }
}

#[async_trait]
impl<T> ScheduleSource for Arc<T>
where
    T: ScheduleSource + ?Sized,
{
    async fn get_schedule(&self, entity_id: &str) -> Result<Option<ScheduleRecord>, SourceError> {
        (**self).get_schedule(entity_id).await
    }
}

#[derive(Clone)]
struct CachedSet {
    set: Arc<RoutingConfigSet>,
    loaded_at: Instant,
}

/// TTL cache per organization + domain in front of any [`RoutingConfigSource`].
///
/// When a refresh fails and an expired entry exists, the stale entry is served.
pub struct CachedRoutingConfigSource<S> {
    inner: S,
    ttl: Duration,
    entries: RwLock<HashMap<(OrganizationId, String), CachedSet>>,
}

impl<S> CachedRoutingConfigSource<S>
where
    S: RoutingConfigSource,
{
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self { inner, ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a shared snapshot, loading through the inner source when missing or expired.
    pub async fn snapshot(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<Arc<RoutingConfigSet>, SourceError> {
        let key = (*organization_id, domain.to_string());
        let cached = self.entries.read().await.get(&key).cloned();

        if let Some(entry) = &cached {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.set));
            }
        }

        match self.inner.get_configs(organization_id, domain).await {
            Ok(set) => {
                let set = Arc::new(set);
                self.entries
                    .write()
                    .await
                    .insert(key, CachedSet { set: Arc::clone(&set), loaded_at: Instant::now() });
                Ok(set)
            }
            Err(error) => match cached {
                Some(stale) => {
                    warn!(
                        event_name = "routing.config_cache.stale_served",
                        organization_id = %organization_id,
                        domain = domain,
                        error = %error,
                        "routing config refresh failed; serving stale snapshot"
                    );
                    Ok(stale.set)
                }
                None => Err(error),
            },
        }
    }

    pub async fn invalidate(&self, organization_id: &OrganizationId) {
        self.entries.write().await.retain(|(org, _), _| org != organization_id);
    }
}

#[async_trait]
impl<S> RoutingConfigSource for CachedRoutingConfigSource<S>
where
    S: RoutingConfigSource,
{
    async fn get_configs(
        &self,
        organization_id: &OrganizationId,
        domain: &str,
    ) -> Result<RoutingConfigSet, SourceError> {
        self.snapshot(organization_id, domain).await.map(|set| (*set).clone())
    }

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError> {
        self.inner.get_awaiting_config(awaiting_type).await
    }
}
