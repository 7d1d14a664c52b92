//! Daily resource capacity overflow resolution.
//!
//! When an allocation would exceed a resource's available minutes on a day,
//! the overflow is computed and three options are returned. Nothing is
//! applied here; the caller picks one.

use chrono::NaiveDate;
use pyo3::prelude::*;
use thiserror::Error;

use crate::calendar::WorkCalendar;
use crate::config::EngineConfig;
use crate::duration::MINUTES_PER_HOUR;
use crate::models::WorkType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapacityError {
    #[error("{field} cannot be negative: {value}")]
    NegativeMinutes { field: &'static str, value: i64 },
    #[error("Hourly rate must be a finite, non-negative number, got {0}")]
    InvalidRate(f64),
}

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionKind {
    /// Move the excess to the next working day at no cost
    PushToNextDay,
    /// Paid overtime on the same working day
    OvertimeWeekday,
    /// Paid overtime on the next weekend day or holiday
    OvertimeWeekend,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionKind::PushToNextDay => "push_next_day",
            ResolutionKind::OvertimeWeekday => "overtime_weekday",
            ResolutionKind::OvertimeWeekend => "overtime_weekend",
        }
    }
}

/// An allocation that may not fit into a resource's day.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct CapacityRequest {
    #[pyo3(get, set)]
    pub resource_id: String,
    #[pyo3(get, set)]
    pub date: NaiveDate,
    /// Capacity of the resource on `date`
    #[pyo3(get, set)]
    pub available_minutes: i64,
    /// Already booked on `date`
    #[pyo3(get, set)]
    pub allocated_minutes: i64,
    /// Minutes the new allocation needs on `date`
    #[pyo3(get, set)]
    pub requested_minutes: i64,
    #[pyo3(get, set)]
    pub hourly_rate: f64,
    #[pyo3(get, set)]
    pub work_type: WorkType,
}

#[pymethods]
impl CapacityRequest {
    #[new]
    #[pyo3(signature = (
        resource_id,
        date,
        available_minutes,
        requested_minutes,
        allocated_minutes=0,
        hourly_rate=0.0,
        work_type=WorkType::Work
    ))]
    fn py_new(
        resource_id: String,
        date: NaiveDate,
        available_minutes: i64,
        requested_minutes: i64,
        allocated_minutes: i64,
        hourly_rate: f64,
        work_type: WorkType,
    ) -> Self {
        Self {
            resource_id,
            date,
            available_minutes,
            allocated_minutes,
            requested_minutes,
            hourly_rate,
            work_type,
        }
    }
}

impl CapacityRequest {
    pub fn new(resource_id: &str, date: NaiveDate, available_minutes: i64, requested_minutes: i64) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            date,
            available_minutes,
            allocated_minutes: 0,
            requested_minutes,
            hourly_rate: 0.0,
            work_type: WorkType::Work,
        }
    }

    pub fn with_allocated(mut self, minutes: i64) -> Self {
        self.allocated_minutes = minutes;
        self
    }

    pub fn with_hourly_rate(mut self, rate: f64) -> Self {
        self.hourly_rate = rate;
        self
    }

    fn validate(&self) -> Result<(), CapacityError> {
        for (field, value) in [
            ("available_minutes", self.available_minutes),
            ("allocated_minutes", self.allocated_minutes),
            ("requested_minutes", self.requested_minutes),
        ] {
            if value < 0 {
                return Err(CapacityError::NegativeMinutes { field, value });
            }
        }
        if !self.hourly_rate.is_finite() || self.hourly_rate < 0.0 {
            return Err(CapacityError::InvalidRate(self.hourly_rate));
        }
        Ok(())
    }

    /// Minutes that do not fit into the day.
    pub fn overflow_minutes(&self) -> i64 {
        (self.allocated_minutes + self.requested_minutes - self.available_minutes).max(0)
    }
}

#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionOption {
    #[pyo3(get)]
    pub kind: ResolutionKind,
    /// Cost multiplier applied to the hourly rate (0 for a push)
    #[pyo3(get)]
    pub multiplier: f64,
    #[pyo3(get)]
    pub overflow_minutes: i64,
    /// Incremental cost of taking this option
    #[pyo3(get)]
    pub estimated_cost: f64,
    /// Day the overflow minutes are worked
    #[pyo3(get)]
    pub work_date: NaiveDate,
    /// New end date when the option moves it
    #[pyo3(get)]
    pub new_end_date: Option<NaiveDate>,
    #[pyo3(get)]
    pub description: String,
}

#[pymethods]
impl ResolutionOption {
    #[getter]
    fn kind_name(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct CapacityResolution {
    #[pyo3(get)]
    pub resource_id: String,
    #[pyo3(get)]
    pub date: NaiveDate,
    #[pyo3(get)]
    pub overflow_minutes: i64,
    /// Always push, weekday overtime, weekend overtime, in that order
    #[pyo3(get)]
    pub options: Vec<ResolutionOption>,
}

impl CapacityResolution {
    pub fn option(&self, kind: ResolutionKind) -> Option<&ResolutionOption> {
        self.options.iter().find(|o| o.kind == kind)
    }
}

/// Overflow options for `request`, or `None` when the allocation fits or does
/// not draw on capacity.
pub fn resolve_capacity(
    request: &CapacityRequest,
    calendar: &WorkCalendar,
    config: &EngineConfig,
) -> Result<Option<CapacityResolution>, CapacityError> {
    request.validate()?;
    if !request.work_type.consumes_capacity() {
        return Ok(None);
    }
    let overflow = request.overflow_minutes();
    if overflow == 0 {
        return Ok(None);
    }

    let cost = |multiplier: f64| {
        overflow as f64 / MINUTES_PER_HOUR as f64 * request.hourly_rate * multiplier
    };
    let hours = overflow as f64 / MINUTES_PER_HOUR as f64;

    let next_working = calendar.next_working_day(request.date);
    let weekday_date = if calendar.is_working_day(request.date) {
        request.date
    } else {
        next_working
    };
    let weekend_date = calendar.next_non_working_day(request.date);

    let options = vec![
        ResolutionOption {
            kind: ResolutionKind::PushToNextDay,
            multiplier: 0.0,
            overflow_minutes: overflow,
            estimated_cost: 0.0,
            work_date: next_working,
            new_end_date: Some(next_working),
            description: format!("Move {:.1}h to {}", hours, next_working),
        },
        ResolutionOption {
            kind: ResolutionKind::OvertimeWeekday,
            multiplier: config.overtime_weekday_multiplier,
            overflow_minutes: overflow,
            estimated_cost: cost(config.overtime_weekday_multiplier),
            work_date: weekday_date,
            new_end_date: None,
            description: format!(
                "Overtime {:.1}h on {} at {}x",
                hours, weekday_date, config.overtime_weekday_multiplier
            ),
        },
        ResolutionOption {
            kind: ResolutionKind::OvertimeWeekend,
            multiplier: config.overtime_weekend_multiplier,
            overflow_minutes: overflow,
            estimated_cost: cost(config.overtime_weekend_multiplier),
            work_date: weekend_date,
            new_end_date: Some(weekend_date),
            description: format!(
                "Overtime {:.1}h on {} at {}x",
                hours, weekend_date, config.overtime_weekend_multiplier
            ),
        },
    ];

    Ok(Some(CapacityResolution {
        resource_id: request.resource_id.clone(),
        date: request.date,
        overflow_minutes: overflow,
        options,
    }))
}
