//! Logging macros for the scheduling engine with verbosity level control.
//!
//! The macros compile down to a single integer comparison when the requested
//! level is above the configured verbosity, and forward to `tracing` otherwise.
//! Verbosity levels:
//! - 0: SILENT (only warnings and errors, which bypass verbosity)
//! - 1: CHANGES (date updates, flag changes, rejected edges)
//! - 2: CHECKS (constraint checks, skipped edges, suppressed conflicts)
//! - 3: DEBUG (full algorithm internals)

use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

const DEFAULT_FILTER: &str = "gantt_rust=info";

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: proposed date updates, critical flag changes, rejected edges.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            tracing::info!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: constraint evaluation, skip reasons, suppressed false positives.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            tracing::debug!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: traversal order, per-task timings.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            tracing::trace!($($arg)*);
        }
    };
}

/// Install a global `tracing` subscriber.
///
/// `filter` takes an `EnvFilter` directive; when absent `RUST_LOG` is used,
/// then `gantt_rust=info`. Returns false if a subscriber was already installed
/// by this function or by the host application.
pub fn init_logging(filter: Option<&str>) -> bool {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return false;
    }

    let env_filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok();

    if installed {
        let _ = SUBSCRIBER_INSTALLED.set(());
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_constants() {
        assert_eq!(VERBOSITY_SILENT, 0);
        assert_eq!(VERBOSITY_CHANGES, 1);
        assert_eq!(VERBOSITY_CHECKS, 2);
        assert_eq!(VERBOSITY_DEBUG, 3);
    }

    #[test]
    fn test_log_macros_compile() {
        let verbosity = VERBOSITY_DEBUG;
        log_changes!(verbosity, "update {}", 1);
        log_checks!(verbosity, "check {}", 2);
        log_debug!(verbosity, "debug {}", 3);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let _first = init_logging(Some("gantt_rust=warn"));
        assert!(!init_logging(Some("gantt_rust=warn")));
    }
}
