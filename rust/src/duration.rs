//! Duration model: conversions between calendar days and work-minutes,
//! free-form duration parsing, formatting and validation.
//!
//! One working day is 540 minutes (9 hours). The legacy import format uses
//! 480-minute days; that constant only applies at the import boundary.

use pyo3::prelude::*;
use thiserror::Error;

use crate::models::WorkType;

/// Minutes in one internal working day.
pub const MINUTES_PER_DAY: i64 = 540;
/// Minutes in one hour.
pub const MINUTES_PER_HOUR: i64 = 60;
/// Minutes per day in the legacy import format.
pub const IMPORT_MINUTES_PER_DAY: i64 = 480;
/// Upper bound for a single work duration (one year of working days).
pub const MAX_DURATION_MINUTES: i64 = 365 * MINUTES_PER_DAY;

/// Errors for malformed or invalid durations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DurationError {
    #[error("Duration is empty")]
    Empty,
    #[error("Invalid duration token: {0:?}")]
    InvalidToken(String),
    #[error("Duration unit '{0}' is repeated or out of order")]
    UnitOutOfOrder(char),
    #[error("Duration cannot be negative: {0} minutes")]
    Negative(i64),
    #[error("Work tasks need a positive duration")]
    ZeroWork,
    #[error("Milestones must have zero duration, got {0} minutes")]
    MilestoneNonZero(i64),
    #[error("Duration {minutes} exceeds the maximum of {max} minutes")]
    TooLong { minutes: i64, max: i64 },
}

/// Output style for [`format_duration`].
#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationFormat {
    /// Whole days when divisible, else hours, else minutes: "2d", "3h", "45m"
    Auto,
    /// Largest fitting unit with one decimal: "1.5d", "2.0h"
    Short,
    /// Spelled out and decomposed: "1 day 2 hours 30 minutes"
    Long,
}

/// Structured pass/fail result for callers that prefer a flag over an error.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationOutcome {
    #[pyo3(get)]
    pub success: bool,
    #[pyo3(get)]
    pub message: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for ValidationOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

#[pymethods]
impl ValidationOutcome {
    fn __repr__(&self) -> String {
        format!(
            "ValidationOutcome(success={}, message={:?})",
            self.success, self.message
        )
    }
}

/// Convert (possibly fractional) days to minutes, rounding to the nearest minute.
pub fn days_to_minutes(days: f64) -> i64 {
    (days * MINUTES_PER_DAY as f64).round() as i64
}

/// Convert minutes to exact fractional days.
pub fn minutes_to_days(minutes: i64) -> f64 {
    minutes as f64 / MINUTES_PER_DAY as f64
}

/// Minutes to whole days, rounding half away from zero. Used for lags.
pub fn minutes_to_whole_days(minutes: i64) -> i64 {
    minutes_to_days(minutes).round() as i64
}

/// Minutes to whole days, rounding up. Used for spans: any started day counts.
pub fn minutes_to_whole_days_ceil(minutes: i64) -> i64 {
    if minutes <= 0 {
        return 0;
    }
    (minutes + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY
}

/// Parse `(<n>d)? (<n>h)? (<n>m)?`, case-insensitive, whitespace optional.
///
/// Each unit may appear at most once and in d, h, m order. Numbers may carry
/// a fractional part ("1.5d"). Returns total minutes, rounded.
pub fn parse_duration(input: &str) -> Result<i64, DurationError> {
    let normalized = input.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut chars = normalized.chars().peekable();
    let mut total = 0.0_f64;
    // Position of the last unit seen in "dhm"; enforces order and uniqueness.
    let mut last_unit: Option<usize> = None;

    while chars.peek().is_some() {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut number = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                chars.next();
            } else {
                break;
            }
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let unit = chars.next();

        let value: f64 = number
            .parse()
            .map_err(|_| DurationError::InvalidToken(token_text(&number, unit)))?;

        let (rank, factor) = match unit {
            Some('d') => (0, MINUTES_PER_DAY as f64),
            Some('h') => (1, MINUTES_PER_HOUR as f64),
            Some('m') => (2, 1.0),
            _ => return Err(DurationError::InvalidToken(token_text(&number, unit))),
        };

        if last_unit.is_some_and(|prev| prev >= rank) {
            return Err(DurationError::UnitOutOfOrder(unit.unwrap_or('?')));
        }
        last_unit = Some(rank);
        total += value * factor;
    }

    if last_unit.is_none() {
        return Err(DurationError::Empty);
    }
    Ok(total.round() as i64)
}

fn token_text(number: &str, unit: Option<char>) -> String {
    match unit {
        Some(u) => format!("{}{}", number, u),
        None => number.to_string(),
    }
}

/// Render minutes as human text.
pub fn format_duration(minutes: i64, mode: DurationFormat) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.abs();

    match mode {
        DurationFormat::Auto => {
            if abs % MINUTES_PER_DAY == 0 {
                format!("{}{}d", sign, abs / MINUTES_PER_DAY)
            } else if abs % MINUTES_PER_HOUR == 0 {
                format!("{}{}h", sign, abs / MINUTES_PER_HOUR)
            } else {
                format!("{}{}m", sign, abs)
            }
        }
        DurationFormat::Short => {
            if abs >= MINUTES_PER_DAY {
                format!("{}{:.1}d", sign, abs as f64 / MINUTES_PER_DAY as f64)
            } else if abs >= MINUTES_PER_HOUR {
                format!("{}{:.1}h", sign, abs as f64 / MINUTES_PER_HOUR as f64)
            } else {
                format!("{}{:.1}m", sign, abs as f64)
            }
        }
        DurationFormat::Long => {
            let days = abs / MINUTES_PER_DAY;
            let hours = (abs % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
            let mins = abs % MINUTES_PER_HOUR;

            let mut parts: Vec<String> = Vec::new();
            if days > 0 {
                parts.push(plural(days, "day"));
            }
            if hours > 0 {
                parts.push(plural(hours, "hour"));
            }
            if mins > 0 || parts.is_empty() {
                parts.push(plural(mins, "minute"));
            }
            format!("{}{}", sign, parts.join(" "))
        }
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Check a duration against the rules for its work type.
pub fn validate_duration(
    minutes: i64,
    work_type: WorkType,
    max_minutes: i64,
) -> Result<(), DurationError> {
    if minutes < 0 {
        return Err(DurationError::Negative(minutes));
    }
    match work_type {
        WorkType::Milestone if minutes != 0 => Err(DurationError::MilestoneNonZero(minutes)),
        WorkType::Milestone => Ok(()),
        WorkType::Work if minutes == 0 => Err(DurationError::ZeroWork),
        _ if minutes > max_minutes => Err(DurationError::TooLong {
            minutes,
            max: max_minutes,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_to_minutes() {
        assert_eq!(days_to_minutes(1.0), 540);
        assert_eq!(days_to_minutes(0.5), 270);
        assert_eq!(days_to_minutes(0.0), 0);
        assert_eq!(days_to_minutes(1.0 / 3.0), 180);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        for d in [0.0, 0.25, 1.0, 1.7, 2.333, 10.0, 123.456] {
            let back = minutes_to_days(days_to_minutes(d));
            // One minute is the step size of the day -> minute conversion.
            assert!((back - d).abs() <= 0.5 / 540.0 + 1e-12, "d={} back={}", d, back);
        }
    }

    #[test]
    fn test_minutes_to_days_is_exact() {
        assert!((minutes_to_days(810) - 1.5).abs() < 1e-12);
        assert!((minutes_to_days(60) - 60.0 / 540.0).abs() < 1e-12);
    }

    #[test]
    fn test_whole_day_helpers() {
        assert_eq!(minutes_to_whole_days(540), 1);
        assert_eq!(minutes_to_whole_days(-1080), -2);
        assert_eq!(minutes_to_whole_days(200), 0);
        assert_eq!(minutes_to_whole_days_ceil(541), 2);
        assert_eq!(minutes_to_whole_days_ceil(0), 0);
    }

    #[test]
    fn test_parse_full_grammar() {
        assert_eq!(parse_duration("1d 2h 30m"), Ok(540 + 120 + 30));
        assert_eq!(parse_duration("2D"), Ok(1080));
        assert_eq!(parse_duration("3h"), Ok(180));
        assert_eq!(parse_duration("45m"), Ok(45));
        assert_eq!(parse_duration("1d30m"), Ok(570));
        assert_eq!(parse_duration("  1.5d  "), Ok(810));
        assert_eq!(parse_duration("2 h"), Ok(120));
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(parse_duration("   "), Err(DurationError::Empty));
        assert!(matches!(parse_duration("5"), Err(DurationError::InvalidToken(_))));
        assert!(matches!(parse_duration("5w"), Err(DurationError::InvalidToken(_))));
        assert!(matches!(parse_duration("d"), Err(DurationError::InvalidToken(_))));
        assert!(matches!(parse_duration("-1d"), Err(DurationError::InvalidToken(_))));
        assert_eq!(parse_duration("2h 1d"), Err(DurationError::UnitOutOfOrder('d')));
        assert_eq!(parse_duration("1d 1d"), Err(DurationError::UnitOutOfOrder('d')));
    }

    #[test]
    fn test_format_auto() {
        assert_eq!(format_duration(1080, DurationFormat::Auto), "2d");
        assert_eq!(format_duration(0, DurationFormat::Auto), "0d");
        assert_eq!(format_duration(180, DurationFormat::Auto), "3h");
        assert_eq!(format_duration(600, DurationFormat::Auto), "10h");
        assert_eq!(format_duration(45, DurationFormat::Auto), "45m");
        assert_eq!(format_duration(-540, DurationFormat::Auto), "-1d");
    }

    #[test]
    fn test_format_short() {
        assert_eq!(format_duration(810, DurationFormat::Short), "1.5d");
        assert_eq!(format_duration(120, DurationFormat::Short), "2.0h");
        assert_eq!(format_duration(30, DurationFormat::Short), "30.0m");
    }

    #[test]
    fn test_format_long() {
        assert_eq!(
            format_duration(540 + 120 + 30, DurationFormat::Long),
            "1 day 2 hours 30 minutes"
        );
        assert_eq!(format_duration(1080, DurationFormat::Long), "2 days");
        assert_eq!(format_duration(61, DurationFormat::Long), "1 hour 1 minute");
        assert_eq!(format_duration(0, DurationFormat::Long), "0 minutes");
    }

    #[test]
    fn test_validate_by_work_type() {
        let max = MAX_DURATION_MINUTES;
        assert_eq!(validate_duration(540, WorkType::Work, max), Ok(()));
        assert_eq!(validate_duration(0, WorkType::Work, max), Err(DurationError::ZeroWork));
        assert_eq!(validate_duration(-5, WorkType::Wait, max), Err(DurationError::Negative(-5)));
        assert_eq!(validate_duration(0, WorkType::Milestone, max), Ok(()));
        assert_eq!(
            validate_duration(60, WorkType::Milestone, max),
            Err(DurationError::MilestoneNonZero(60))
        );
        assert!(matches!(
            validate_duration(max + 1, WorkType::Work, max),
            Err(DurationError::TooLong { .. })
        ));
        assert_eq!(validate_duration(0, WorkType::Wait, max), Ok(()));
    }

    #[test]
    fn test_validation_outcome_from_result() {
        let ok: ValidationOutcome = validate_duration(540, WorkType::Work, MAX_DURATION_MINUTES).into();
        assert!(ok.success);
        let failed: ValidationOutcome = parse_duration("abc").map(|_| ()).into();
        assert!(!failed.success);
        assert!(failed.message.is_some());
    }
}
