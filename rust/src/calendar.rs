//! Working-day calendar.
//!
//! `work` tasks advance only on working days; `wait` tasks advance on
//! calendar days; milestones occupy a single point in time.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use pyo3::prelude::*;
use rustc_hash::FxHashSet;

use crate::duration::minutes_to_whole_days_ceil;
use crate::models::WorkType;

/// Upper bound on day-by-day scans so a calendar with no working days
/// cannot spin forever.
const MAX_SCAN_DAYS: u32 = 3660;

/// Working weekdays plus holiday exceptions.
#[pyclass]
#[derive(Clone, Debug)]
pub struct WorkCalendar {
    /// Working weekdays as 0=Mon .. 6=Sun
    #[pyo3(get, set)]
    pub working_weekdays: Vec<u32>,
    /// Non-working dates regardless of weekday
    #[pyo3(get, set)]
    pub holidays: Vec<NaiveDate>,
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self {
            working_weekdays: vec![0, 1, 2, 3, 4],
            holidays: Vec::new(),
        }
    }
}

#[pymethods]
impl WorkCalendar {
    #[new]
    #[pyo3(signature = (working_weekdays=None, holidays=None))]
    fn new(working_weekdays: Option<Vec<u32>>, holidays: Option<Vec<NaiveDate>>) -> Self {
        let defaults = Self::default();
        Self {
            working_weekdays: working_weekdays.unwrap_or(defaults.working_weekdays),
            holidays: holidays.unwrap_or_default(),
        }
    }

    /// Whether `date` is a working day.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if self.holidays.contains(&date) {
            return false;
        }
        self.working_weekdays
            .contains(&date.weekday().num_days_from_monday())
    }

    /// First working day strictly after `date`.
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        self.scan_forward(date, |d| self.is_working_day(d))
    }

    /// First non-working day (weekend or holiday) strictly after `date`.
    pub fn next_non_working_day(&self, date: NaiveDate) -> NaiveDate {
        self.scan_forward(date, |d| !self.is_working_day(d))
    }

    /// Date of the `count`-th working day counting `start` itself as the first
    /// when it is a working day. `count <= 1` returns the first working day
    /// on or after `start`.
    pub fn add_working_days(&self, start: NaiveDate, count: i64) -> NaiveDate {
        let mut current = if self.is_working_day(start) {
            start
        } else {
            self.next_working_day(start)
        };
        let mut remaining = count - 1;
        while remaining > 0 {
            let next = self.next_working_day(current);
            if next == current {
                break;
            }
            current = next;
            remaining -= 1;
        }
        current
    }

    /// Inclusive end date for a task of the given type and duration.
    pub fn end_date_for(
        &self,
        start: NaiveDate,
        duration_minutes: i64,
        work_type: WorkType,
    ) -> NaiveDate {
        let days = minutes_to_whole_days_ceil(duration_minutes).max(1);
        match work_type {
            WorkType::Milestone => start,
            WorkType::Work => self.add_working_days(start, days),
            WorkType::Wait => start
                .checked_add_days(Days::new((days - 1) as u64))
                .unwrap_or(start),
        }
    }

    /// Number of working days in `start..=end`.
    pub fn working_days_between(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        if end < start {
            return 0;
        }
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_working_day(*d))
            .count() as i64
    }

    fn __repr__(&self) -> String {
        format!(
            "WorkCalendar(working_weekdays={:?}, holidays={})",
            self.working_weekdays,
            self.holidays.len()
        )
    }
}

impl WorkCalendar {
    /// Calendar with an explicit holiday set on top of Mon-Fri.
    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        let unique: FxHashSet<NaiveDate> = holidays.into_iter().collect();
        let mut holidays: Vec<NaiveDate> = unique.into_iter().collect();
        holidays.sort();
        Self {
            holidays,
            ..Self::default()
        }
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    fn scan_forward(&self, date: NaiveDate, accept: impl Fn(NaiveDate) -> bool) -> NaiveDate {
        let mut candidate = date;
        for _ in 0..MAX_SCAN_DAYS {
            candidate = match candidate.succ_opt() {
                Some(d) => d,
                None => return candidate,
            };
            if accept(candidate) {
                return candidate;
            }
        }
        date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekends_are_not_working_days() {
        let cal = WorkCalendar::default();
        assert!(cal.is_working_day(date(2024, 3, 8))); // Friday
        assert!(!cal.is_working_day(date(2024, 3, 9))); // Saturday
        assert!(!cal.is_working_day(date(2024, 3, 10))); // Sunday
        assert!(WorkCalendar::is_weekend(date(2024, 3, 10)));
    }

    #[test]
    fn test_holidays() {
        let cal = WorkCalendar::with_holidays([date(2024, 3, 11)]);
        assert!(!cal.is_working_day(date(2024, 3, 11)));
        assert_eq!(cal.next_working_day(date(2024, 3, 8)), date(2024, 3, 12));
    }

    #[test]
    fn test_next_non_working_day() {
        let cal = WorkCalendar::default();
        assert_eq!(cal.next_non_working_day(date(2024, 3, 6)), date(2024, 3, 9));
    }

    #[test]
    fn test_add_working_days_skips_weekend() {
        let cal = WorkCalendar::default();
        // Thu + 3 working days (Thu, Fri, Mon)
        assert_eq!(cal.add_working_days(date(2024, 3, 7), 3), date(2024, 3, 11));
        // Starting on Saturday moves to Monday first
        assert_eq!(cal.add_working_days(date(2024, 3, 9), 1), date(2024, 3, 11));
    }

    #[test]
    fn test_end_date_by_work_type() {
        let cal = WorkCalendar::default();
        let start = date(2024, 3, 7);
        assert_eq!(cal.end_date_for(start, 3 * 540, WorkType::Work), date(2024, 3, 11));
        assert_eq!(cal.end_date_for(start, 3 * 540, WorkType::Wait), date(2024, 3, 9));
        assert_eq!(cal.end_date_for(start, 0, WorkType::Milestone), start);
    }

    #[test]
    fn test_working_days_between() {
        let cal = WorkCalendar::default();
        assert_eq!(cal.working_days_between(date(2024, 3, 4), date(2024, 3, 10)), 5);
        assert_eq!(cal.working_days_between(date(2024, 3, 10), date(2024, 3, 4)), 0);
    }

    #[test]
    fn test_calendar_without_working_days_terminates() {
        let cal = WorkCalendar {
            working_weekdays: vec![],
            holidays: vec![],
        };
        let start = date(2024, 1, 1);
        assert_eq!(cal.next_working_day(start), start);
        assert_eq!(cal.add_working_days(start, 5), start);
    }
}
