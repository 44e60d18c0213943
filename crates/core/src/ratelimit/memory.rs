use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CounterStore;
use crate::errors::StoreError;

#[derive(Clone, Copy, Debug)]
struct Counter {
    value: u64,
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Process-local counter store. Expired keys are dropped on access and by
/// [`CounterStore::purge_expired`].
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl InMemoryCounterStore {
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.counters.lock().await.values().filter(|counter| counter.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        match counters.get(key) {
            Some(counter) if counter.is_live(now) => Ok(Some(counter.value)),
            Some(_) => {
                counters.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let counter =
            counters.entry(key.to_string()).or_insert(Counter { value: 0, expires_at: None });
        if !counter.is_live(now) {
            *counter = Counter { value: 0, expires_at: None };
        }
        counter.value = counter.value.saturating_add(1);
        Ok(counter.value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        if let Some(counter) = counters.get_mut(key) {
            if counter.is_live(now) {
                counter.expires_at = Some(now + Duration::from_secs(seconds));
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let counters = self.counters.lock().await;
        let remaining = counters
            .get(key)
            .filter(|counter| counter.is_live(now))
            .and_then(|counter| counter.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
            .map(|remaining| {
                let whole = remaining.as_secs();
                if remaining.subsec_nanos() > 0 {
                    whole + 1
                } else {
                    whole
                }
            });
        Ok(remaining)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.counters.lock().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|_, counter| counter.is_live(now));
        Ok((before - counters.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::InMemoryCounterStore;
    use crate::ratelimit::{spawn_purge_task, CounterStore};

    #[tokio::test(start_paused = true)]
    async fn expired_counters_restart_from_one() {
        let store = InMemoryCounterStore::default();

        assert_eq!(store.incr("k").await.expect("incr"), 1);
        store.expire("k", 10).await.expect("expire");
        assert_eq!(store.incr("k").await.expect("incr"), 2);
        assert_eq!(store.ttl("k").await.expect("ttl"), Some(10));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
        assert_eq!(store.incr("k").await.expect("incr"), 1);
        assert_eq!(store.ttl("k").await.expect("ttl"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_keys_nobody_touches_again() {
        let store = InMemoryCounterStore::default();
        for identity in ["a", "b", "c"] {
            store.incr(identity).await.expect("incr");
        }
        store.expire("a", 5).await.expect("expire");
        store.expire("b", 60).await.expect("expire");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
        assert_eq!(store.counters.lock().await.len(), 2);
        assert_eq!(store.get("b").await.expect("get"), Some(1));
        assert_eq!(store.get("c").await.expect("get"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_purges_on_its_interval() {
        let store = Arc::new(InMemoryCounterStore::default());
        store.incr("idle").await.expect("incr");
        store.expire("idle", 1).await.expect("expire");
        let sweeper = spawn_purge_task(Arc::clone(&store), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.counters.lock().await.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn missing_keys_report_nothing() {
        let store = InMemoryCounterStore::default();
        assert_eq!(store.get("absent").await.expect("get"), None);
        assert_eq!(store.ttl("absent").await.expect("ttl"), None);
        store.delete("absent").await.expect("delete is idempotent");
        assert!(store.is_empty().await);
    }
}
