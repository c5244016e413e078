use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::solar::{SampleInterval, SolarError};

/// Longest stretch of nonexistent local time we probe for when midnight is skipped.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Position of an instant on the local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalSlot {
    pub date: NaiveDate,
    /// Minutes since local midnight, 0..=1439.
    pub minute_of_day: u16,
}

/// Maps UTC instants onto local days of one IANA timezone.
///
/// The offset is looked up per instant, so daylight-saving transitions move
/// day boundaries exactly as the wall clock does. A single value is shared by
/// every consumer that buckets samples by day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCalendar {
    tz: Tz,
}

impl LocalCalendar {
    pub fn new(timezone: &str) -> Result<Self, SolarError> {
        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| SolarError::TimezoneResolution(timezone.to_string()))?;
        Ok(Self { tz })
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    pub fn locate(&self, instant: DateTime<Utc>) -> LocalSlot {
        let local = instant.with_timezone(&self.tz);
        LocalSlot {
            date: local.date_naive(),
            minute_of_day: (local.hour() * 60 + local.minute()) as u16,
        }
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn local_year(&self, instant: DateTime<Utc>) -> i32 {
        self.local_date(instant).year()
    }

    /// First instant belonging to `date`.
    ///
    /// An ambiguous midnight resolves to its earlier occurrence; a skipped
    /// midnight resolves to the first local minute that exists.
    pub fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        for offset in 0..=MAX_GAP_MINUTES {
            let candidate = midnight + Duration::minutes(offset);
            if let Some(local) = self.tz.from_local_datetime(&candidate).earliest() {
                return local.with_timezone(&Utc);
            }
        }

        // The whole date is missing locally (e.g. Pacific/Apia, 2011-12-30).
        let fixed = self.tz.offset_from_utc_datetime(&midnight).fix();
        Utc.from_utc_datetime(&midnight) - Duration::seconds(fixed.local_minus_utc() as i64)
    }

    /// Wall-clock length of a local day: 1380 on spring-forward, 1500 on fall-back.
    pub fn day_length_minutes(&self, date: NaiveDate) -> i64 {
        let next = next_day(date);
        (self.local_midnight(next) - self.local_midnight(date)).num_minutes()
    }

    /// Readings a complete day holds at the given cadence.
    pub fn expected_slots(&self, date: NaiveDate, interval: SampleInterval) -> usize {
        let length = self.day_length_minutes(date).max(0) as usize;
        length / interval.minutes() as usize
    }
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(NaiveDate::MAX)
}

/// Inclusive, chronological run of local dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DaySpan {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        if first <= last {
            Self { first, last }
        } else {
            Self {
                first: last,
                last: first,
            }
        }
    }

    pub fn calendar_year(year: i32) -> Option<Self> {
        Some(Self {
            first: NaiveDate::from_ymd_opt(year, 1, 1)?,
            last: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    pub fn union(self, other: DaySpan) -> Self {
        Self {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let last = self.last;
        self.first.iter_days().take_while(move |d| *d <= last)
    }

    pub fn len(&self) -> usize {
        (self.last - self.first).num_days() as usize + 1
    }
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pacific() -> LocalCalendar {
        LocalCalendar::new("America/Los_Angeles").unwrap()
    }

    #[test]
    fn test_unknown_timezone_fails() {
        let err = LocalCalendar::new("Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(err, SolarError::TimezoneResolution(ref name) if name == "Mars/Olympus_Mons"));
    }

    #[test]
    fn test_locate_uses_offset_of_the_instant() {
        let cal = pacific();

        // PST, UTC-8
        let winter = cal.locate(utc(2024, 1, 1, 8, 0));
        assert_eq!(winter.date, date(2024, 1, 1));
        assert_eq!(winter.minute_of_day, 0);

        // PDT, UTC-7
        let summer = cal.locate(utc(2024, 7, 1, 7, 0));
        assert_eq!(summer.date, date(2024, 7, 1));
        assert_eq!(summer.minute_of_day, 0);

        // Still the previous local day
        let late = cal.locate(utc(2024, 7, 1, 6, 55));
        assert_eq!(late.date, date(2024, 6, 30));
        assert_eq!(late.minute_of_day, 1435);
    }

    #[test]
    fn test_fall_back_repeats_minutes() {
        let cal = pacific();
        let first = cal.locate(utc(2024, 11, 3, 8, 30));
        let second = cal.locate(utc(2024, 11, 3, 9, 30));
        assert_eq!(first, second);
        assert_eq!(first.minute_of_day, 90);
    }

    #[test]
    fn test_spring_forward_skips_an_hour() {
        let cal = pacific();
        assert_eq!(cal.locate(utc(2024, 3, 10, 9, 55)).minute_of_day, 115);
        assert_eq!(cal.locate(utc(2024, 3, 10, 10, 0)).minute_of_day, 180);
    }

    #[test]
    fn test_day_lengths_across_transitions() {
        let cal = pacific();
        assert_eq!(cal.day_length_minutes(date(2024, 3, 9)), 1440);
        assert_eq!(cal.day_length_minutes(date(2024, 3, 10)), 1380);
        assert_eq!(cal.day_length_minutes(date(2024, 11, 3)), 1500);

        let five = SampleInterval::FIVE_MINUTES;
        let normal = cal.expected_slots(date(2024, 6, 21), five);
        let spring = cal.expected_slots(date(2024, 3, 10), five);
        let fall = cal.expected_slots(date(2024, 11, 3), five);
        assert_eq!(normal, 288);
        assert_eq!(normal - spring, 60 / 5);
        assert_eq!(fall - normal, 60 / 5);
    }

    #[test]
    fn test_skipped_midnight_resolves_to_first_valid_minute() {
        // Chile moves clocks from 00:00 to 01:00.
        let cal = LocalCalendar::new("America/Santiago").unwrap();
        let start = cal.local_midnight(date(2024, 9, 8));
        let slot = cal.locate(start);
        assert_eq!(slot.date, date(2024, 9, 8));
        assert_eq!(slot.minute_of_day, 60);
        assert_eq!(cal.day_length_minutes(date(2024, 9, 8)), 1380);
    }

    #[test]
    fn test_utc_calendar_has_fixed_days() {
        let cal = LocalCalendar::new("UTC").unwrap();
        assert_eq!(cal.local_midnight(date(2024, 2, 29)), utc(2024, 2, 29, 0, 0));
        assert_eq!(cal.day_length_minutes(date(2024, 3, 31)), 1440);
    }

    #[test]
    fn test_day_span() {
        let span = DaySpan::calendar_year(2024).unwrap();
        assert_eq!(span.len(), 366);
        assert_eq!(span.days().count(), 366);
        assert_eq!(DaySpan::calendar_year(2023).unwrap().len(), 365);

        let narrow = DaySpan::new(date(2024, 1, 3), date(2024, 1, 1));
        assert_eq!(narrow.first, date(2024, 1, 1));
        let wide = narrow.union(DaySpan::new(date(2023, 12, 31), date(2024, 1, 2)));
        assert_eq!(wide.len(), 4);
        assert!(wide.contains(date(2023, 12, 31)));
        assert!(!wide.contains(date(2024, 1, 4)));

        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
    }
}
