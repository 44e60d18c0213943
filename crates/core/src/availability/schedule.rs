use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::DomainError;

/// Stored schedule for one entity. `hours` maps weekday names to `"HH:MM-HH:MM"`;
/// a missing, null or blank entry means closed that day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub hours: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    pub fn parse(day: Weekday, raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::InvalidScheduleRange {
            day: weekday_key(day).to_string(),
            value: raw.to_string(),
        };

        let (open, close) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let open = NaiveTime::parse_from_str(open.trim(), "%H:%M").map_err(|_| invalid())?;
        let close = NaiveTime::parse_from_str(close.trim(), "%H:%M").map_err(|_| invalid())?;
        Ok(Self { open, close })
    }

    pub fn is_overnight(&self) -> bool {
        self.close < self.open
    }

    /// Both ends are inclusive at minute precision, so the whole close minute
    /// counts as open. Equal open and close means open all day.
    pub fn contains(&self, now: NaiveTime) -> bool {
        let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);
        if self.open == self.close {
            true
        } else if self.is_overnight() {
            now >= self.open || now <= self.close
        } else {
            self.open <= now && now <= self.close
        }
    }
}

/// Parsed per-weekday ranges, indexed from Monday.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: [Option<DayHours>; 7],
}

impl WeeklySchedule {
    /// Parses a record's hours. Unknown day names and malformed ranges are
    /// logged and leave that day closed.
    pub fn from_hours(hours: &BTreeMap<String, Option<String>>) -> Self {
        let mut days = [None; 7];
        for (key, value) in hours {
            let Some(day) = parse_weekday(key) else {
                warn!(
                    event_name = "gate.business_hours.unknown_day",
                    day = key.as_str(),
                    "ignoring schedule entry for unrecognized weekday"
                );
                continue;
            };
            let Some(raw) = value.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) else {
                continue;
            };
            match DayHours::parse(day, raw) {
                Ok(hours) => days[day.num_days_from_monday() as usize] = Some(hours),
                Err(error) => warn!(
                    event_name = "gate.business_hours.invalid_range",
                    error = %error,
                    "treating malformed schedule range as closed"
                ),
            }
        }
        Self { days }
    }

    pub fn hours_for(&self, day: Weekday) -> Option<DayHours> {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Option::is_none)
    }
}

pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    match raw.trim().to_lowercase().as_str() {
        "monday" | "mon" | "lunes" => Some(Weekday::Mon),
        "tuesday" | "tue" | "martes" => Some(Weekday::Tue),
        "wednesday" | "wed" | "miercoles" | "miércoles" => Some(Weekday::Wed),
        "thursday" | "thu" | "jueves" => Some(Weekday::Thu),
        "friday" | "fri" | "viernes" => Some(Weekday::Fri),
        "saturday" | "sat" | "sabado" | "sábado" => Some(Weekday::Sat),
        "sunday" | "sun" | "domingo" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn weekday_display_es(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lunes",
        Weekday::Tue => "martes",
        Weekday::Wed => "miércoles",
        Weekday::Thu => "jueves",
        Weekday::Fri => "viernes",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveTime, Weekday};

    use super::{parse_weekday, DayHours, WeeklySchedule};

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn overnight_range_spans_midnight() {
        let hours = DayHours::parse(Weekday::Fri, "22:00-02:00").expect("valid range");
        assert!(hours.is_overnight());
        assert!(hours.contains(at(23, 30)));
        assert!(hours.contains(at(1, 15)));
        assert!(!hours.contains(at(12, 0)));
    }

    #[test]
    fn close_minute_is_open_until_its_last_second() {
        let hours = DayHours::parse(Weekday::Mon, "08:00-20:00").expect("valid range");
        let second = |h, m, s| NaiveTime::from_hms_opt(h, m, s).expect("valid time");

        assert!(hours.contains(second(8, 0, 0)));
        assert!(hours.contains(second(20, 0, 0)));
        assert!(hours.contains(second(20, 0, 30)));
        assert!(hours.contains(second(20, 0, 59)));
        assert!(!hours.contains(second(20, 1, 0)));
        assert!(!hours.contains(second(7, 59, 59)));

        let overnight = DayHours::parse(Weekday::Fri, "22:00-02:00").expect("valid range");
        assert!(overnight.contains(second(2, 0, 45)));
        assert!(!overnight.contains(second(2, 1, 0)));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!(DayHours::parse(Weekday::Mon, "8am-8pm").is_err());
        assert!(DayHours::parse(Weekday::Mon, "08:00").is_err());
        assert!(DayHours::parse(Weekday::Mon, "25:00-26:00").is_err());
    }

    #[test]
    fn schedule_skips_blank_and_invalid_days() {
        let mut raw = BTreeMap::new();
        raw.insert("lunes".to_string(), Some("08:00-18:00".to_string()));
        raw.insert("tuesday".to_string(), Some("  ".to_string()));
        raw.insert("wednesday".to_string(), Some("broken".to_string()));
        raw.insert("someday".to_string(), Some("08:00-18:00".to_string()));
        raw.insert("sunday".to_string(), None);

        let schedule = WeeklySchedule::from_hours(&raw);
        assert!(schedule.hours_for(Weekday::Mon).is_some());
        assert!(schedule.hours_for(Weekday::Tue).is_none());
        assert!(schedule.hours_for(Weekday::Wed).is_none());
        assert!(schedule.hours_for(Weekday::Sun).is_none());
    }

    #[test]
    fn weekday_names_accept_spanish_and_accents() {
        assert_eq!(parse_weekday("Miércoles"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("SABADO"), Some(Weekday::Sat));
        assert_eq!(parse_weekday("funday"), None);
    }
}
