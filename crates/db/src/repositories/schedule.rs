use std::collections::BTreeMap;

use async_trait::async_trait;
use dialroute_core::availability::ScheduleRecord;
use dialroute_core::errors::SourceError;
use dialroute_core::sources::ScheduleSource;
use sqlx::Row;

use super::{decode_error, RepositoryError};
use crate::DbPool;

const WEEKDAY_COLUMNS: [&str; 7] =
    ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];

/// Weekly schedules, one row per entity with a column per weekday.
pub struct SqlScheduleRepository {
    pool: DbPool,
    /// Applied when a row leaves `enabled` NULL.
    default_enabled: bool,
}

impl SqlScheduleRepository {
    pub fn new(pool: DbPool, default_enabled: bool) -> Self {
        Self { pool, default_enabled }
    }

    pub async fn find(&self, entity_id: &str) -> Result<Option<ScheduleRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT enabled, monday, tuesday, wednesday, thursday, friday, saturday, sunday,
                    emergency_contact, timezone
             FROM business_schedule WHERE entity_id = ?",
        )
        .bind(entity_id.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(self.row_to_record(r)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, entity_id: &str, record: &ScheduleRecord) -> Result<(), RepositoryError> {
        let day = |name: &str| record.hours.get(name).cloned().flatten();

        sqlx::query(
            "INSERT INTO business_schedule (entity_id, enabled, monday, tuesday, wednesday, thursday,
                                            friday, saturday, sunday, emergency_contact, timezone,
                                            updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(entity_id) DO UPDATE SET
                 enabled = excluded.enabled,
                 monday = excluded.monday,
                 tuesday = excluded.tuesday,
                 wednesday = excluded.wednesday,
                 thursday = excluded.thursday,
                 friday = excluded.friday,
                 saturday = excluded.saturday,
                 sunday = excluded.sunday,
                 emergency_contact = excluded.emergency_contact,
                 timezone = excluded.timezone,
                 updated_at = excluded.updated_at",
        )
        .bind(entity_id.trim())
        .bind(record.enabled)
        .bind(day("monday"))
        .bind(day("tuesday"))
        .bind(day("wednesday"))
        .bind(day("thursday"))
        .bind(day("friday"))
        .bind(day("saturday"))
        .bind(day("sunday"))
        .bind(&record.emergency_contact)
        .bind(&record.timezone)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ScheduleRecord, RepositoryError> {
        let enabled: Option<bool> = row.try_get("enabled").map_err(decode_error)?;
        let mut hours = BTreeMap::new();
        for column in WEEKDAY_COLUMNS {
            let value: Option<String> = row.try_get(column).map_err(decode_error)?;
            hours.insert(column.to_string(), value.filter(|range| !range.trim().is_empty()));
        }
        let emergency_contact: Option<String> =
            row.try_get("emergency_contact").map_err(decode_error)?;
        let timezone: Option<String> = row.try_get("timezone").map_err(decode_error)?;

        Ok(ScheduleRecord {
            enabled: enabled.unwrap_or(self.default_enabled),
            hours,
            emergency_contact: emergency_contact.filter(|contact| !contact.trim().is_empty()),
            timezone: timezone.filter(|zone| !zone.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ScheduleSource for SqlScheduleRepository {
    async fn get_schedule(&self, entity_id: &str) -> Result<Option<ScheduleRecord>, SourceError> {
        Ok(self.find(entity_id).await?)
    }
}
