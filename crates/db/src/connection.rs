use std::str::FromStr;
use std::time::Duration;

use dialroute_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// In-memory SQLite databases are private to one connection, so `sqlite::memory:`
/// urls are always opened with a single connection that is never recycled.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));
    let options = if in_memory { options } else { options.journal_mode(SqliteJournalMode::Wal) };

    let mut pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { max_connections.max(1) })
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        pool = pool.idle_timeout(None).max_lifetime(None);
    }

    pool.connect_with(options).await
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, is_in_memory};

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:routing?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://dialroute.db"));
    }

    #[tokio::test]
    async fn memory_pool_uses_one_connection() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");
        sqlx::query("CREATE TABLE scratch (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO scratch VALUES (1)").execute(&pool).await.expect("insert");
        assert_eq!(pool.options().get_max_connections(), 1);
    }
}
