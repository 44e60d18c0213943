//! Sliding-window quotas per identity backed by an atomic counter store.
//!
//! Each quota is an expiring counter keyed by `ratelimit:{type}:{identity}`.
//! The first increment of a window sets the expiry, later increments never
//! touch it, so a busy identity cannot keep extending its own window.
//!
//! Every store failure is fail-open: the message is allowed and the result is
//! flagged `degraded`.

mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::errors::StoreError;

pub use memory::InMemoryCounterStore;

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError>;
    /// Remaining lifetime in seconds; `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drops every expired key and returns how many went. Stores that expire
    /// keys natively keep the default.
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[async_trait]
impl<T> CounterStore for std::sync::Arc<T>
where
    T: CounterStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).get(key).await
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        (**self).incr(key).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        (**self).expire(key, seconds).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        (**self).purge_expired().await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitType {
    MessagesPerMinute,
    MessagesPerHour,
    ExternalQueriesPerHour,
    PaymentLinksPerDay,
}

impl RateLimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessagesPerMinute => "messages_per_minute",
            Self::MessagesPerHour => "messages_per_hour",
            Self::ExternalQueriesPerHour => "external_queries_per_hour",
            Self::PaymentLinksPerDay => "payment_links_per_day",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(limit: u64, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub messages_per_minute: RateLimitRule,
    pub messages_per_hour: RateLimitRule,
    pub external_queries_per_hour: RateLimitRule,
    pub payment_links_per_day: RateLimitRule,
    pub store_timeout_ms: u64,
    /// Seconds between expired-counter sweeps; 0 disables the sweeper.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_purge_interval_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: RateLimitRule::new(10, 60),
            messages_per_hour: RateLimitRule::new(100, 3_600),
            external_queries_per_hour: RateLimitRule::new(20, 3_600),
            payment_links_per_day: RateLimitRule::new(5, 86_400),
            store_timeout_ms: 500,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn rule(&self, limit_type: RateLimitType) -> RateLimitRule {
        match limit_type {
            RateLimitType::MessagesPerMinute => self.messages_per_minute,
            RateLimitType::MessagesPerHour => self.messages_per_hour,
            RateLimitType::ExternalQueriesPerHour => self.external_queries_per_hour,
            RateLimitType::PaymentLinksPerDay => self.payment_links_per_day,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub limit_type: RateLimitType,
    pub allowed: bool,
    pub current_count: u64,
    pub limit: u64,
    pub retry_after_secs: Option<u64>,
    /// Set when the store could not be consulted and the result is a fail-open default.
    pub degraded: bool,
}

impl RateLimitResult {
    fn fail_open(limit_type: RateLimitType, rule: RateLimitRule) -> Self {
        Self {
            limit_type,
            allowed: true,
            current_count: 0,
            limit: rule.limit,
            retry_after_secs: None,
            degraded: true,
        }
    }
}

pub struct RateLimiter<S> {
    store: S,
    config: RateLimitConfig,
}

impl<S> RateLimiter<S>
where
    S: CounterStore,
{
    pub fn new(store: S, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key(identity: &str, limit_type: RateLimitType) -> String {
        format!("ratelimit:{}:{}", limit_type.as_str(), identity.trim())
    }

    /// Reads the current count without consuming quota.
    pub async fn check(&self, identity: &str, limit_type: RateLimitType) -> RateLimitResult {
        let rule = self.config.rule(limit_type);
        let key = Self::key(identity, limit_type);

        match self.try_check(&key, limit_type, rule).await {
            Ok(result) => result,
            Err(error) => {
                log_fail_open(identity, limit_type, "check", &error);
                RateLimitResult::fail_open(limit_type, rule)
            }
        }
    }

    /// Consumes one unit of quota and returns the post-increment count.
    pub async fn increment(&self, identity: &str, limit_type: RateLimitType) -> Option<u64> {
        let rule = self.config.rule(limit_type);
        let key = Self::key(identity, limit_type);

        match self.try_increment(&key, rule).await {
            Ok(count) => Some(count),
            Err(error) => {
                log_fail_open(identity, limit_type, "increment", &error);
                None
            }
        }
    }

    /// Check, then consume quota only when allowed.
    pub async fn hit(&self, identity: &str, limit_type: RateLimitType) -> RateLimitResult {
        let mut result = self.check(identity, limit_type).await;
        if !result.allowed || result.degraded {
            return result;
        }

        match self.increment(identity, limit_type).await {
            Some(count) => result.current_count = count,
            None => result.degraded = true,
        }
        result
    }

    /// Compound check for an inbound message: the per-minute quota is evaluated
    /// first and a denial there short-circuits the per-hour quota. Both counters
    /// are consumed only when both allow.
    pub async fn check_message(&self, identity: &str) -> RateLimitResult {
        let minute = self.check(identity, RateLimitType::MessagesPerMinute).await;
        if !minute.allowed {
            debug!(
                event_name = "gate.rate_limit.denied",
                identity = identity,
                limit_type = minute.limit_type.as_str(),
                current_count = minute.current_count,
                "message denied by per-minute quota"
            );
            return minute;
        }

        let hour = self.check(identity, RateLimitType::MessagesPerHour).await;
        if !hour.allowed {
            debug!(
                event_name = "gate.rate_limit.denied",
                identity = identity,
                limit_type = hour.limit_type.as_str(),
                current_count = hour.current_count,
                "message denied by per-hour quota"
            );
            return hour;
        }

        let minute_count = self.increment(identity, RateLimitType::MessagesPerMinute).await;
        let hour_count = self.increment(identity, RateLimitType::MessagesPerHour).await;

        RateLimitResult {
            current_count: minute_count.unwrap_or(minute.current_count),
            degraded: minute.degraded
                || hour.degraded
                || minute_count.is_none()
                || hour_count.is_none(),
            ..minute
        }
    }

    pub async fn reset(&self, identity: &str, limit_type: RateLimitType) {
        let key = Self::key(identity, limit_type);
        if let Err(error) = self.bounded(self.store.delete(&key)).await {
            log_fail_open(identity, limit_type, "reset", &error);
        }
    }

    async fn try_check(
        &self,
        key: &str,
        limit_type: RateLimitType,
        rule: RateLimitRule,
    ) -> Result<RateLimitResult, StoreError> {
        let current_count = self.bounded(self.store.get(key)).await?.unwrap_or(0);

        if current_count >= rule.limit {
            let ttl = self.bounded(self.store.ttl(key)).await?;
            return Ok(RateLimitResult {
                limit_type,
                allowed: false,
                current_count,
                limit: rule.limit,
                retry_after_secs: Some(ttl.unwrap_or(rule.window_secs)),
                degraded: false,
            });
        }

        Ok(RateLimitResult {
            limit_type,
            allowed: true,
            current_count,
            limit: rule.limit,
            retry_after_secs: None,
            degraded: false,
        })
    }

    async fn try_increment(&self, key: &str, rule: RateLimitRule) -> Result<u64, StoreError> {
        let count = self.bounded(self.store.incr(key)).await?;
        if count == 1 {
            self.bounded(self.store.expire(key, rule.window_secs)).await?;
        }
        Ok(count)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout_ms = self.config.store_timeout_ms;
        tokio::time::timeout(Duration::from_millis(timeout_ms), call)
            .await
            .map_err(|_| StoreError::Timeout { timeout_ms })?
    }
}

/// Sweeps expired counters from `store` every `every` until the runtime shuts
/// down. Identities that never come back would otherwise keep their rows.
pub fn spawn_purge_task<S>(store: S, every: Duration) -> JoinHandle<()>
where
    S: CounterStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(
                    event_name = "gate.rate_limit.purged",
                    purged = purged,
                    "expired rate-limit counters removed"
                ),
                Err(error) => warn!(
                    event_name = "gate.rate_limit.purge_failed",
                    error = %error,
                    "expired rate-limit counter sweep failed"
                ),
            }
        }
    })
}

fn log_fail_open(identity: &str, limit_type: RateLimitType, operation: &str, error: &StoreError) {
    warn!(
        event_name = "gate.rate_limit.fail_open",
        identity = identity,
        limit_type = limit_type.as_str(),
        operation = operation,
        error = %error,
        "counter store failure; allowing message"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{
        CounterStore, InMemoryCounterStore, RateLimitConfig, RateLimitRule, RateLimitType,
        RateLimiter,
    };
    use crate::errors::StoreError;

    fn limiter(minute: RateLimitRule, hour: RateLimitRule) -> RateLimiter<InMemoryCounterStore> {
        RateLimiter::new(
            InMemoryCounterStore::default(),
            RateLimitConfig {
                messages_per_minute: minute,
                messages_per_hour: hour,
                ..RateLimitConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn eleventh_hit_in_window_is_denied_and_window_expiry_restores_quota() {
        let limiter = limiter(RateLimitRule::new(10, 60), RateLimitRule::new(1_000, 3_600));

        for attempt in 1..=10 {
            let result = limiter.hit("+573001112233", RateLimitType::MessagesPerMinute).await;
            assert!(result.allowed, "attempt {attempt} should be allowed");
            assert_eq!(result.current_count, attempt);
        }

        let denied = limiter.hit("+573001112233", RateLimitType::MessagesPerMinute).await;
        assert!(!denied.allowed);
        assert_eq!(denied.current_count, 10);
        assert_eq!(denied.limit, 10);
        assert!(denied.retry_after_secs.is_some_and(|secs| secs > 0 && secs <= 60));

        tokio::time::advance(Duration::from_secs(61)).await;

        let after_window = limiter.hit("+573001112233", RateLimitType::MessagesPerMinute).await;
        assert!(after_window.allowed);
        assert_eq!(after_window.current_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_set_only_by_first_increment() {
        let limiter = limiter(RateLimitRule::new(10, 60), RateLimitRule::new(100, 3_600));
        let key = RateLimiter::<InMemoryCounterStore>::key("user-1", RateLimitType::MessagesPerMinute);

        limiter.increment("user-1", RateLimitType::MessagesPerMinute).await;
        tokio::time::advance(Duration::from_secs(40)).await;
        limiter.increment("user-1", RateLimitType::MessagesPerMinute).await;

        let ttl = limiter.store().ttl(&key).await.expect("ttl should be readable");
        assert_eq!(ttl, Some(20), "second increment must not extend the window");
    }

    #[tokio::test(start_paused = true)]
    async fn compound_check_short_circuits_on_the_shorter_window() {
        let limiter = limiter(RateLimitRule::new(2, 60), RateLimitRule::new(100, 3_600));

        assert!(limiter.check_message("user-2").await.allowed);
        assert!(limiter.check_message("user-2").await.allowed);

        let denied = limiter.check_message("user-2").await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit_type, RateLimitType::MessagesPerMinute);

        let hour = limiter.check("user-2", RateLimitType::MessagesPerHour).await;
        assert_eq!(hour.current_count, 2, "denied message must not consume hourly quota");
    }

    #[tokio::test(start_paused = true)]
    async fn hourly_denial_reports_hourly_quota() {
        let limiter = limiter(RateLimitRule::new(50, 60), RateLimitRule::new(1, 3_600));

        assert!(limiter.check_message("user-3").await.allowed);
        let denied = limiter.check_message("user-3").await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit_type, RateLimitType::MessagesPerHour);
        assert!(denied.retry_after_secs.is_some_and(|secs| secs <= 3_600));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_the_counter() {
        let limiter = limiter(RateLimitRule::new(1, 60), RateLimitRule::new(100, 3_600));

        limiter.hit("user-4", RateLimitType::PaymentLinksPerDay).await;
        limiter.hit("user-4", RateLimitType::PaymentLinksPerDay).await;
        limiter.reset("user-4", RateLimitType::PaymentLinksPerDay).await;

        let result = limiter.check("user-4", RateLimitType::PaymentLinksPerDay).await;
        assert_eq!(result.current_count, 0);
        assert!(result.allowed);
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn incr(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Malformed("ttl=abc".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            std::future::pending().await
        }

        async fn incr(&self, _key: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }

        async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            std::future::pending().await
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn unavailable_store_fails_open() {
        let limiter = RateLimiter::new(BrokenStore, RateLimitConfig::default());

        let result = limiter.check_message("user-5").await;
        assert!(result.allowed);
        assert!(result.degraded);

        let hit = limiter.hit("user-5", RateLimitType::ExternalQueriesPerHour).await;
        assert!(hit.allowed);
        assert!(hit.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_times_out_and_fails_open() {
        let limiter = RateLimiter::new(
            HangingStore,
            RateLimitConfig { store_timeout_ms: 100, ..RateLimitConfig::default() },
        );

        let result = limiter.check("user-6", RateLimitType::MessagesPerMinute).await;
        assert!(result.allowed);
        assert!(result.degraded);
    }
}
