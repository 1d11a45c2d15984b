use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::ReconcileError;

/// A time of day, in UTC, at which the job runs once per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    time: NaiveTime,
}

impl DailySchedule {
    /// Returns `None` if the hour or minute is out of range.
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
    }

    /// The first run strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.time).and_utc();
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// How long to sleep from `now` until the next run.
    pub fn delay_from(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

impl Default for DailySchedule {
    /// 16:02 UTC.
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(16, 2, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl FromStr for DailySchedule {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReconcileError::InvalidSchedule(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::at(hour, minute).ok_or_else(invalid)
    }
}

impl std::fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.time.format("%H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_default_is_sixteen_oh_two() {
        assert_eq!(DailySchedule::default().to_string(), "16:02");
    }

    #[test]
    fn test_parse() {
        let schedule: DailySchedule = "03:30".parse().unwrap();
        assert_eq!(schedule, DailySchedule::at(3, 30).unwrap());
        assert!("24:00".parse::<DailySchedule>().is_err());
        assert!("1630".parse::<DailySchedule>().is_err());
        assert!("aa:bb".parse::<DailySchedule>().is_err());
    }

    #[test]
    fn test_next_after_same_day_and_next_day() {
        let schedule = DailySchedule::default();
        let morning = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(morning),
            Utc.with_ymd_and_hms(2024, 5, 10, 16, 2, 0).unwrap()
        );

        let exactly = Utc.with_ymd_and_hms(2024, 5, 10, 16, 2, 0).unwrap();
        assert_eq!(
            schedule.next_after(exactly),
            Utc.with_ymd_and_hms(2024, 5, 11, 16, 2, 0).unwrap()
        );
    }

    #[test]
    fn test_delay_from() {
        let schedule = DailySchedule::at(10, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap();
        assert_eq!(schedule.delay_from(now), std::time::Duration::from_secs(1800));
    }
}
