//! Service-hours gate.
//!
//! Decides whether the automated channel is open for an entity right now, in
//! the entity's reference time zone, and when it reopens if it is not. Any
//! failure to obtain a schedule leaves the channel open.

mod schedule;

use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sources::ScheduleSource;

pub use schedule::{
    parse_weekday, weekday_display_es, weekday_key, DayHours, ScheduleRecord, WeeklySchedule,
};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Bogota;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHoursResult {
    pub is_open: bool,
    pub current_time: String,
    pub current_day: String,
    pub today_open: Option<String>,
    pub today_close: Option<String>,
    pub next_open_day: Option<String>,
    pub next_open_time: Option<String>,
    /// Whole days until the next opening; 0 means later today.
    pub next_open_in_days: Option<u32>,
    pub emergency_contact: Option<String>,
    pub timezone: String,
    /// Set when the schedule could not be consulted and the result is a fail-open default.
    pub degraded: bool,
}

impl BusinessHoursResult {
    fn open_without_schedule(now: DateTime<Tz>, degraded: bool) -> Self {
        Self {
            is_open: true,
            current_time: format_hhmm(now.hour(), now.minute()),
            current_day: weekday_key(now.weekday()).to_string(),
            today_open: None,
            today_close: None,
            next_open_day: None,
            next_open_time: None,
            next_open_in_days: None,
            emergency_contact: None,
            timezone: now.timezone().name().to_string(),
            degraded,
        }
    }

    /// Human-facing reopening notice; `None` while open.
    pub fn reopen_message(&self) -> Option<String> {
        if self.is_open {
            return None;
        }

        let mut message = match (&self.next_open_day, &self.next_open_time, self.next_open_in_days)
        {
            (_, Some(time), Some(0)) => {
                format!("Nuestro horario de atención se reanuda hoy a las {time}.")
            }
            (Some(_), Some(time), Some(1)) => {
                format!("Nuestro horario de atención se reanuda mañana a las {time}.")
            }
            (Some(day), Some(time), _) => {
                let display = parse_weekday(day).map(weekday_display_es).unwrap_or(day.as_str());
                format!("Nuestro horario de atención se reanuda el {display} a las {time}.")
            }
            _ => "En este momento estamos fuera de nuestro horario de atención.".to_string(),
        };

        if let Some(contact) = &self.emergency_contact {
            message.push_str(&format!(" Para urgencias comunícate al {contact}."));
        }
        Some(message)
    }
}

/// Pure evaluation of one schedule record at a given instant.
pub fn evaluate_record(
    record: &ScheduleRecord,
    default_timezone: Tz,
    now: DateTime<Utc>,
) -> BusinessHoursResult {
    let timezone = resolve_timezone(record.timezone.as_deref(), default_timezone);
    let local = now.with_timezone(&timezone);

    if !record.enabled {
        return BusinessHoursResult::open_without_schedule(local, false);
    }

    let schedule = WeeklySchedule::from_hours(&record.hours);
    let today = local.weekday();
    let time = local.time();
    let todays_hours = schedule.hours_for(today);
    let is_open = todays_hours.is_some_and(|hours| hours.contains(time));

    let next_open = if is_open { None } else { next_opening(&schedule, today, local) };

    BusinessHoursResult {
        is_open,
        current_time: format_hhmm(local.hour(), local.minute()),
        current_day: weekday_key(today).to_string(),
        today_open: todays_hours.map(|hours| hours.open.format("%H:%M").to_string()),
        today_close: todays_hours.map(|hours| hours.close.format("%H:%M").to_string()),
        next_open_day: next_open.map(|(day, _, _)| weekday_key(day).to_string()),
        next_open_time: next_open.map(|(_, hours, _)| hours.open.format("%H:%M").to_string()),
        next_open_in_days: next_open.map(|(_, _, offset)| offset),
        emergency_contact: record.emergency_contact.clone(),
        timezone: timezone.name().to_string(),
        degraded: false,
    }
}

/// Remaining part of today first, then the following seven days.
fn next_opening(
    schedule: &WeeklySchedule,
    today: Weekday,
    local: DateTime<Tz>,
) -> Option<(Weekday, DayHours, u32)> {
    if let Some(hours) = schedule.hours_for(today) {
        if local.time() < hours.open {
            return Some((today, hours, 0));
        }
    }

    let mut day = today;
    for offset in 1..=7 {
        day = day.succ();
        if let Some(hours) = schedule.hours_for(day) {
            return Some((day, hours, offset));
        }
    }
    None
}

fn resolve_timezone(raw: Option<&str>, default_timezone: Tz) -> Tz {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => default_timezone,
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                event_name = "gate.business_hours.invalid_timezone",
                timezone = name,
                fallback = default_timezone.name(),
                "unknown schedule time zone; using default"
            );
            default_timezone
        }),
    }
}

fn format_hhmm(hour: u32, minute: u32) -> String {
    format!("{hour:02}:{minute:02}")
}

pub struct BusinessHoursEvaluator<S> {
    source: S,
    default_timezone: Tz,
    lookup_timeout: Duration,
}

impl<S> BusinessHoursEvaluator<S>
where
    S: ScheduleSource,
{
    pub fn new(source: S, default_timezone: Tz, lookup_timeout: Duration) -> Self {
        Self { source, default_timezone, lookup_timeout }
    }

    pub async fn evaluate(&self, entity_id: &str) -> BusinessHoursResult {
        self.evaluate_at(entity_id, Utc::now()).await
    }

    pub async fn evaluate_at(&self, entity_id: &str, now: DateTime<Utc>) -> BusinessHoursResult {
        let lookup = tokio::time::timeout(self.lookup_timeout, self.source.get_schedule(entity_id));
        let local_now = now.with_timezone(&self.default_timezone);

        let record = match lookup.await {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => {
                warn!(
                    event_name = "gate.business_hours.fail_open",
                    entity_id = entity_id,
                    reason = "schedule_missing",
                    "no schedule configured; assuming available"
                );
                return BusinessHoursResult::open_without_schedule(local_now, true);
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "gate.business_hours.fail_open",
                    entity_id = entity_id,
                    reason = "source_error",
                    error = %error,
                    "schedule lookup failed; assuming available"
                );
                return BusinessHoursResult::open_without_schedule(local_now, true);
            }
            Err(_) => {
                warn!(
                    event_name = "gate.business_hours.fail_open",
                    entity_id = entity_id,
                    reason = "timeout",
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "schedule lookup timed out; assuming available"
                );
                return BusinessHoursResult::open_without_schedule(local_now, true);
            }
        };

        let result = evaluate_record(&record, self.default_timezone, now);
        debug!(
            event_name = "gate.business_hours.evaluated",
            entity_id = entity_id,
            is_open = result.is_open,
            current_day = result.current_day.as_str(),
            current_time = result.current_time.as_str(),
            "business hours evaluated"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{evaluate_record, BusinessHoursEvaluator, ScheduleRecord, DEFAULT_TIMEZONE};
    use crate::errors::SourceError;
    use crate::sources::ScheduleSource;

    fn bogota(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        DEFAULT_TIMEZONE
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    fn record(entries: &[(&str, &str)]) -> ScheduleRecord {
        let mut hours = BTreeMap::new();
        for (day, range) in entries {
            hours.insert((*day).to_string(), Some((*range).to_string()));
        }
        ScheduleRecord {
            enabled: true,
            hours,
            emergency_contact: Some("018000 123 456".to_string()),
            timezone: None,
        }
    }

    // 2026-10-12 is a Monday.
    #[test]
    fn monday_range_is_open_just_before_close() {
        let result = evaluate_record(
            &record(&[("monday", "08:00-20:00")]),
            DEFAULT_TIMEZONE,
            bogota(2026, 10, 12, 19, 59),
        );

        assert!(result.is_open);
        assert_eq!(result.current_day, "monday");
        assert_eq!(result.current_time, "19:59");
        assert_eq!(result.today_open.as_deref(), Some("08:00"));
        assert_eq!(result.today_close.as_deref(), Some("20:00"));
        assert!(result.reopen_message().is_none());
    }

    #[test]
    fn monday_range_is_closed_just_after_close_and_reopens_next_configured_day() {
        let result = evaluate_record(
            &record(&[("monday", "08:00-20:00")]),
            DEFAULT_TIMEZONE,
            bogota(2026, 10, 12, 20, 1),
        );

        assert!(!result.is_open);
        assert_eq!(result.next_open_day.as_deref(), Some("monday"));
        assert_eq!(result.next_open_time.as_deref(), Some("08:00"));
        assert_eq!(result.next_open_in_days, Some(7));

        let with_tuesday = evaluate_record(
            &record(&[("monday", "08:00-20:00"), ("tuesday", "09:00-17:00")]),
            DEFAULT_TIMEZONE,
            bogota(2026, 10, 12, 20, 1),
        );
        assert_eq!(with_tuesday.next_open_day.as_deref(), Some("tuesday"));
        assert_eq!(with_tuesday.next_open_in_days, Some(1));
        let message = with_tuesday.reopen_message().expect("closed result has a message");
        assert!(message.contains("mañana a las 09:00"));
        assert!(message.contains("018000 123 456"));
    }

    #[test]
    fn closed_before_opening_reopens_later_today() {
        let result = evaluate_record(
            &record(&[("monday", "08:00-20:00")]),
            DEFAULT_TIMEZONE,
            bogota(2026, 10, 12, 6, 30),
        );

        assert!(!result.is_open);
        assert_eq!(result.next_open_day.as_deref(), Some("monday"));
        assert_eq!(result.next_open_in_days, Some(0));
        assert!(result.reopen_message().is_some_and(|message| message.contains("hoy a las 08:00")));
    }

    #[test]
    fn overnight_range_is_open_after_midnight() {
        let schedule = record(&[("monday", "22:00-02:00")]);

        assert!(evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 12, 23, 0)).is_open);
        assert!(evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 12, 1, 30)).is_open);

        let midday = evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 12, 12, 0));
        assert!(!midday.is_open);
        assert_eq!(midday.next_open_in_days, Some(0));
        assert_eq!(midday.next_open_time.as_deref(), Some("22:00"));
    }

    #[test]
    fn disabled_schedule_is_always_open() {
        let mut schedule = record(&[]);
        schedule.enabled = false;

        let result = evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 18, 3, 0));
        assert!(result.is_open);
        assert!(!result.degraded);
    }

    #[test]
    fn record_time_zone_overrides_default() {
        let mut schedule = record(&[("monday", "08:00-20:00")]);
        schedule.timezone = Some("America/Mexico_City".to_string());

        // 20:30 in Bogotá is 19:30 in Mexico City.
        let result = evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 12, 20, 30));
        assert!(result.is_open);
        assert_eq!(result.timezone, "America/Mexico_City");

        schedule.timezone = Some("Mars/Olympus".to_string());
        let fallback = evaluate_record(&schedule, DEFAULT_TIMEZONE, bogota(2026, 10, 12, 20, 30));
        assert_eq!(fallback.timezone, DEFAULT_TIMEZONE.name());
    }

    enum Behaviour {
        Missing,
        Failing,
        Hanging,
        Present(ScheduleRecord),
    }

    struct FakeSchedules(Behaviour);

    #[async_trait]
    impl ScheduleSource for FakeSchedules {
        async fn get_schedule(
            &self,
            _entity_id: &str,
        ) -> Result<Option<ScheduleRecord>, SourceError> {
            match &self.0 {
                Behaviour::Missing => Ok(None),
                Behaviour::Failing => Err(SourceError::Unavailable("no such table".to_string())),
                Behaviour::Hanging => std::future::pending().await,
                Behaviour::Present(record) => Ok(Some(record.clone())),
            }
        }
    }

    fn evaluator(behaviour: Behaviour) -> BusinessHoursEvaluator<FakeSchedules> {
        BusinessHoursEvaluator::new(
            FakeSchedules(behaviour),
            Tz::America__Bogota,
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn lookup_failures_fail_open() {
        let at = bogota(2026, 10, 12, 23, 0);

        for behaviour in [Behaviour::Missing, Behaviour::Failing] {
            let result = evaluator(behaviour).evaluate_at("org-1", at).await;
            assert!(result.is_open);
            assert!(result.degraded);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_fails_open() {
        let result = evaluator(Behaviour::Hanging).evaluate_at("org-1", bogota(2026, 10, 12, 23, 0)).await;
        assert!(result.is_open);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn present_schedule_is_evaluated() {
        let result = evaluator(Behaviour::Present(record(&[("monday", "08:00-20:00")])))
            .evaluate_at("org-1", bogota(2026, 10, 12, 21, 0))
            .await;
        assert!(!result.is_open);
        assert!(!result.degraded);
    }
}
