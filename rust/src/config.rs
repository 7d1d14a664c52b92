//! Configuration types for the scheduling engine.

use pyo3::prelude::*;

use crate::duration::{IMPORT_MINUTES_PER_DAY, MAX_DURATION_MINUTES};

/// Engine-wide constants and tuning knobs.
#[pyclass]
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Day length used by the legacy import format; the internal day is
    /// always `MINUTES_PER_DAY`
    #[pyo3(get, set)]
    pub import_minutes_per_day: i64,
    /// Sanity bound for work durations
    #[pyo3(get, set)]
    pub max_duration_minutes: i64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Settle window before a debounced CPM recompute fires
    #[pyo3(get, set)]
    pub debounce_ms: u64,
    /// Slack (in days) at or below which a target deadline counts as tight
    #[pyo3(get, set)]
    pub tight_threshold_days: i64,
    /// Cost multiplier for overtime on a working day
    #[pyo3(get, set)]
    pub overtime_weekday_multiplier: f64,
    /// Cost multiplier for overtime on a weekend or holiday
    #[pyo3(get, set)]
    pub overtime_weekend_multiplier: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            import_minutes_per_day: IMPORT_MINUTES_PER_DAY,
            max_duration_minutes: MAX_DURATION_MINUTES,
            verbosity: 0,
            debounce_ms: 500,
            tight_threshold_days: 2,
            overtime_weekday_multiplier: 1.5,
            overtime_weekend_multiplier: 2.0,
        }
    }
}

#[pymethods]
impl EngineConfig {
    #[new]
    #[pyo3(signature = (
        import_minutes_per_day=None,
        max_duration_minutes=None,
        verbosity=None,
        debounce_ms=None,
        tight_threshold_days=None,
        overtime_weekday_multiplier=None,
        overtime_weekend_multiplier=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        import_minutes_per_day: Option<i64>,
        max_duration_minutes: Option<i64>,
        verbosity: Option<u8>,
        debounce_ms: Option<u64>,
        tight_threshold_days: Option<i64>,
        overtime_weekday_multiplier: Option<f64>,
        overtime_weekend_multiplier: Option<f64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            import_minutes_per_day: import_minutes_per_day
                .unwrap_or(defaults.import_minutes_per_day),
            max_duration_minutes: max_duration_minutes.unwrap_or(defaults.max_duration_minutes),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            debounce_ms: debounce_ms.unwrap_or(defaults.debounce_ms),
            tight_threshold_days: tight_threshold_days.unwrap_or(defaults.tight_threshold_days),
            overtime_weekday_multiplier: overtime_weekday_multiplier
                .unwrap_or(defaults.overtime_weekday_multiplier),
            overtime_weekend_multiplier: overtime_weekend_multiplier
                .unwrap_or(defaults.overtime_weekend_multiplier),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "EngineConfig(import_minutes_per_day={}, verbosity={}, debounce_ms={})",
            self.import_minutes_per_day, self.verbosity, self.debounce_ms
        )
    }
}

impl EngineConfig {
    /// Debounce settle window as a `std::time::Duration`.
    pub fn debounce_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.import_minutes_per_day, 480);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.tight_threshold_days, 2);
        assert!((config.overtime_weekday_multiplier - 1.5).abs() < 1e-9);
        assert!((config.overtime_weekend_multiplier - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_debounce_delay() {
        let config = EngineConfig {
            debounce_ms: 250,
            ..EngineConfig::default()
        };
        assert_eq!(config.debounce_delay(), std::time::Duration::from_millis(250));
    }
}
