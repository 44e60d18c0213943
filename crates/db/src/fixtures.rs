use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

/// Expected row counts for the demo organization, checked by [`RoutingSeedDataset::verify`].
const SEED_CONFIG_COUNTS: &[(&str, i64)] = &[
    ("menu_option", 6),
    ("global_keyword", 5),
    ("button_mapping", 4),
    ("intent_node_mapping", 14),
];

const SEED_AWAITING_TYPES: &[&str] =
    &["dni", "payment_amount", "agreement_amount", "confirmation", "account_choice"];

const SEED_ENTITY_IDS: &[&str] = &["entity-demo", "entity-night", "entity-unconfigured"];

/// Demo routing rules, awaiting types and schedules for the collections domain.
///
/// Loading is idempotent: every statement is `INSERT OR IGNORE`.
pub struct RoutingSeedDataset;

impl RoutingSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/routing_seed.sql");
    pub const ORGANIZATION_ID: u64 = 1;
    pub const DOMAIN: &str = "collections";
    pub const ENTITY_ID: &str = "entity-demo";

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            organization_id: Self::ORGANIZATION_ID,
            domain: Self::DOMAIN,
            routing_configs: SEED_CONFIG_COUNTS.iter().map(|(_, count)| *count as u64).sum(),
            awaiting_types: SEED_AWAITING_TYPES.len() as u64,
            schedules: SEED_ENTITY_IDS.len() as u64,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (config_type, expected) in SEED_CONFIG_COUNTS {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM routing_config
                 WHERE organization_id = ?1 AND domain = ?2 AND config_type = ?3 AND is_active = 1",
            )
            .bind(Self::ORGANIZATION_ID as i64)
            .bind(Self::DOMAIN)
            .bind(config_type)
            .fetch_one(pool)
            .await?;
            checks.push((*config_type, count >= *expected));
        }

        for awaiting_type in SEED_AWAITING_TYPES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM awaiting_type_config WHERE awaiting_type = ?1 AND is_active = 1)",
            )
            .bind(awaiting_type)
            .fetch_one(pool)
            .await?;
            checks.push((*awaiting_type, exists == 1));
        }

        for entity_id in SEED_ENTITY_IDS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM business_schedule WHERE entity_id = ?1)",
            )
            .bind(entity_id)
            .fetch_one(pool)
            .await?;
            checks.push((*entity_id, exists == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo organization's rules, the seeded awaiting types and schedules.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM routing_config WHERE organization_id = ?1 AND domain = ?2")
            .bind(Self::ORGANIZATION_ID as i64)
            .bind(Self::DOMAIN)
            .execute(&mut *tx)
            .await?;
        for awaiting_type in SEED_AWAITING_TYPES {
            sqlx::query("DELETE FROM awaiting_type_config WHERE awaiting_type = ?1")
                .bind(awaiting_type)
                .execute(&mut *tx)
                .await?;
        }
        for entity_id in SEED_ENTITY_IDS {
            sqlx::query("DELETE FROM business_schedule WHERE entity_id = ?1")
                .bind(entity_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub organization_id: u64,
    pub domain: &'static str,
    pub routing_configs: u64,
    pub awaiting_types: u64,
    pub schedules: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().filter(|(_, ok)| !ok).map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::RoutingSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_twice_and_cleans() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let empty = RoutingSeedDataset::verify(&pool).await.expect("verify");
        assert!(!empty.all_present);

        let seeded = RoutingSeedDataset::load(&pool).await.expect("first load");
        assert_eq!(seeded.routing_configs, 29);
        RoutingSeedDataset::load(&pool).await.expect("second load is a no-op");

        let verified = RoutingSeedDataset::verify(&pool).await.expect("verify");
        assert!(verified.all_present, "failed: {:?}", verified.failed_checks().collect::<Vec<_>>());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM routing_config")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 29);

        RoutingSeedDataset::clean(&pool).await.expect("clean");
        assert!(!RoutingSeedDataset::verify(&pool).await.expect("verify").all_present);
    }
}
