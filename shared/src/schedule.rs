//! Menu dates, delivery times and ordering deadlines, all provider-local.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{LunchError, LunchResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub deadline_at: NaiveDateTime,
}

impl Schedule {
    pub fn parse(date: &str, delivery_time: &str, deadline: &str) -> LunchResult<Self> {
        let date = parse_date(date)?;
        let delivery_time = parse_time(delivery_time).ok_or_else(|| {
            LunchError::validation("Wrong delivery time or deadline was set")
        })?;
        let deadline_at = parse_datetime(deadline).ok_or_else(|| {
            LunchError::validation("Wrong delivery time or deadline was set")
        })?;

        Ok(Self {
            date,
            delivery_time,
            deadline_at,
        })
    }

    pub fn delivery_at(&self) -> NaiveDateTime {
        self.date.and_time(self.delivery_time)
    }

    /// Checks ordering of deadline and delivery against provider-local `now`.
    pub fn validate(&self, now: NaiveDateTime) -> LunchResult<()> {
        if self.deadline_at > self.delivery_at() {
            return Err(LunchError::validation(
                "Deadline cannot be after delivery time",
            ));
        }
        if self.deadline_at <= now {
            return Err(LunchError::validation("Deadline cannot be in past"));
        }
        if self.delivery_at() <= now {
            return Err(LunchError::validation("Delivery time cannot be in past"));
        }
        Ok(())
    }

    /// Moves the schedule to `date`, keeping the deadline's distance to the menu day.
    pub fn moved_to(&self, date: NaiveDate) -> LunchResult<Self> {
        let days = date.signed_duration_since(self.date).num_days();
        let deadline_at = Duration::try_days(days)
            .and_then(|shift| self.deadline_at.checked_add_signed(shift))
            .ok_or_else(|| LunchError::validation(format!("Cannot move menu to {}", date)))?;

        Ok(Self {
            date,
            delivery_time: self.delivery_time,
            deadline_at,
        })
    }
}

pub fn parse_date(value: &str) -> LunchResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| LunchError::validation(format!("Invalid date format: {}", value)))
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value.trim(), format).ok())
}

/// Accepts `YYYY-MM-DD HH:MM[:SS]`, also in its `T`/`Z` decorated form.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let normalized = value.trim().replace('T', " ").replace('Z', "");
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
}

/// First instant of `date` in `tz`. Midnight skipped by a DST jump moves to
/// the first local hour that exists.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> LunchResult<DateTime<Utc>> {
    (0..3)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| LunchError::validation(format!("No start of day for {} in {}", date, tz.name())))
}

/// Half-open UTC range covering the local days `from..=to`.
pub fn day_range(from: &str, to: &str, tz: Tz) -> LunchResult<(DateTime<Utc>, DateTime<Utc>)> {
    let from = parse_date(from)?;
    let to = parse_date(to)?;
    if from > to {
        return Err(LunchError::validation("Range start cannot be after its end"));
    }

    let end = to
        .succ_opt()
        .ok_or_else(|| LunchError::validation(format!("Invalid date: {}", to)))?;
    Ok((start_of_day(from, tz)?, start_of_day(end, tz)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        parse_datetime(value).unwrap()
    }

    #[test]
    fn parses_supported_formats() {
        let schedule = Schedule::parse("2024-05-10", "13:00", "2024-05-10T10:30:00Z").unwrap();
        assert_eq!(schedule.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(schedule.delivery_time, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        assert_eq!(schedule.deadline_at, at("2024-05-10 10:30:00"));
        assert_eq!(schedule.delivery_at(), at("2024-05-10 13:00"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            Schedule::parse("10.05.2024", "13:00", "2024-05-10 10:30"),
            Err(LunchError::Validation(_))
        ));
        assert!(matches!(
            Schedule::parse("2024-05-10", "1pm", "2024-05-10 10:30"),
            Err(LunchError::Validation(_))
        ));
        assert!(matches!(
            Schedule::parse("2024-05-10", "13:00", "tomorrow"),
            Err(LunchError::Validation(_))
        ));
    }

    #[test]
    fn deadline_must_precede_delivery() {
        let schedule = Schedule::parse("2024-05-10", "13:00", "2024-05-10 13:30").unwrap();
        assert_eq!(
            schedule.validate(at("2024-05-09 09:00")),
            Err(LunchError::validation("Deadline cannot be after delivery time"))
        );
    }

    #[test]
    fn both_must_be_in_future() {
        let schedule = Schedule::parse("2024-05-10", "13:00", "2024-05-10 10:00").unwrap();
        assert!(schedule.validate(at("2024-05-10 09:59")).is_ok());
        assert_eq!(
            schedule.validate(at("2024-05-10 10:00")),
            Err(LunchError::validation("Deadline cannot be in past"))
        );
    }

    #[test]
    fn moved_schedule_shifts_deadline_by_day_delta() {
        let schedule = Schedule::parse("2024-05-10", "13:00", "2024-05-09 18:00").unwrap();
        let moved = schedule
            .moved_to(NaiveDate::from_ymd_opt(2024, 5, 13).unwrap())
            .unwrap();
        assert_eq!(moved.deadline_at, at("2024-05-12 18:00"));
        assert_eq!(moved.delivery_time, schedule.delivery_time);

        let back = schedule
            .moved_to(NaiveDate::from_ymd_opt(2024, 5, 8).unwrap())
            .unwrap();
        assert_eq!(back.deadline_at, at("2024-05-07 18:00"));
    }

    #[test]
    fn moving_past_calendar_bounds_is_rejected() {
        // deadline the day before, so the shift leaves the representable range
        let schedule = Schedule::parse("2024-05-10", "13:00", "2024-05-09 18:00").unwrap();
        assert!(matches!(
            schedule.moved_to(NaiveDate::MIN),
            Err(LunchError::Validation(_))
        ));

        let late = Schedule::parse("2024-05-10", "13:00", "2024-05-11 18:00").unwrap();
        assert!(matches!(
            late.moved_to(NaiveDate::MAX),
            Err(LunchError::Validation(_))
        ));
    }

    #[test]
    fn day_range_covers_whole_local_days() {
        let kyiv: Tz = "Europe/Kyiv".parse().unwrap();
        let (from, to) = day_range("2024-05-01", "2024-05-02", kyiv).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 4, 30, 21, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 5, 2, 21, 0, 0).unwrap());
    }

    #[test]
    fn day_range_rejects_reversed_bounds() {
        assert!(matches!(
            day_range("2024-05-02", "2024-05-01", Tz::UTC),
            Err(LunchError::Validation(_))
        ));
    }

    #[test]
    fn start_of_day_skips_missing_midnight() {
        // Santiago springs forward from 00:00 to 01:00
        let santiago: Tz = "America/Santiago".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 9, 8).unwrap();
        let start = start_of_day(date, santiago).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 9, 8, 4, 0, 0).unwrap());
    }
}
