//! Logging for the dbfs workspace
//!
//! Provides lightweight, configurable structured logging shared by every crate.
//!
//! Usage:
//! - Set DBFS_LOG=off (default) - no logs
//! - Set DBFS_LOG=info - basic operation logs
//! - Set DBFS_LOG=debug - detailed diagnostic logs

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

static INIT: Once = Once::new();

/// Name of the environment variable selecting the log level
pub const LOG_ENV: &str = "DBFS_LOG";

fn min_level(name: &str) -> Option<emit::Level> {
    match name {
        "debug" => Some(emit::Level::Debug),
        "info" => Some(emit::Level::Info),
        "warn" => Some(emit::Level::Warn),
        "error" => Some(emit::Level::Error),
        _ => None,
    }
}

/// Initialize diagnostics based on the DBFS_LOG environment variable
///
/// Safe to call multiple times, subsequent calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
        if log_level == "off" {
            return;
        }

        let level = min_level(&log_level).unwrap_or(emit::Level::Info);
        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if min_level(&log_level).is_none() {
            emit::warn!("Unknown {env} value '{log_level}', using 'info'", env: LOG_ENV, log_level);
        }

        // The runtime lives for the whole process
        std::mem::forget(rt);
    });
}

/// Log detailed diagnostics (row counts, chunk flushes, lock traffic)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log basic operations (store opened, trash cleaned, renames)
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log recoverable problems (skipped rows, forced close, idle streams)
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that prevent an operation from completing
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(min_level("debug"), Some(emit::Level::Debug));
        assert_eq!(min_level("error"), Some(emit::Level::Error));
        assert_eq!(min_level("verbose"), None);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_diagnostics();
        init_diagnostics();
    }
}
