//! Critical Path Method over a project's predecessor DAG.
//!
//! Timings are integer work-minutes offset from the project start. Only the
//! derived `is_critical_path` flag is ever written back to task records.

mod calculation;
mod types;

pub use calculation::calculate_critical_path;
pub use types::{CpmError, CpmResult, TaskTiming};
