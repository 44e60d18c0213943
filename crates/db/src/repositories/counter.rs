use async_trait::async_trait;
use chrono::Utc;
use dialroute_core::errors::StoreError;
use dialroute_core::ratelimit::CounterStore;

use super::RepositoryError;
use crate::DbPool;

/// Rate-limit counters in SQLite. Expired rows read as absent and are reset by
/// the next increment; each increment is a single atomic upsert. Rows of
/// identities that never return are removed by `purge_expired`.
#[derive(Clone)]
pub struct SqlCounterStore {
    pool: DbPool,
}

impl SqlCounterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn to_count(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Malformed(format!("negative counter value {value}")))
}

#[async_trait]
impl CounterStore for SqlCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM rate_limit_counter
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now())
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        value.map(to_count).transpose()
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO rate_limit_counter (key, value, expires_at) VALUES (?1, 1, NULL)
             ON CONFLICT(key) DO UPDATE SET
                 value = CASE
                     WHEN expires_at IS NOT NULL AND expires_at <= ?2 THEN 1
                     ELSE value + 1
                 END,
                 expires_at = CASE
                     WHEN expires_at IS NOT NULL AND expires_at <= ?2 THEN NULL
                     ELSE expires_at
                 END
             RETURNING value",
        )
        .bind(key)
        .bind(now())
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        to_count(value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let seconds = i64::try_from(seconds)
            .map_err(|_| StoreError::Malformed(format!("expiry of {seconds}s out of range")))?;
        sqlx::query("UPDATE rate_limit_counter SET expires_at = ? WHERE key = ?")
            .bind(now().saturating_add(seconds))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let expires_at: Option<Option<i64>> =
            sqlx::query_scalar("SELECT expires_at FROM rate_limit_counter WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(RepositoryError::from)?;

        let remaining = expires_at.flatten().map(|deadline| deadline - now());
        Ok(remaining.filter(|seconds| *seconds > 0).map(|seconds| seconds as u64))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM rate_limit_counter WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM rate_limit_counter WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(result.rows_affected())
    }
}
