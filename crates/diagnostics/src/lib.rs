//! Logging setup shared by the filestore crates
//!
//! Wraps `emit` with a stderr emitter whose minimum level is chosen by the
//! `FILESTORE_LOG` environment variable:
//! - `off` (default) - no logs
//! - `error`, `warn`, `info` - progressively more operational logs
//! - `debug` - every remote call and retry decision

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable consulted by [`init_diagnostics`]
pub const LOG_ENV: &str = "FILESTORE_LOG";

static INIT: Once = Once::new();

/// Parsed value of the log environment variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Min(emit::Level),
    /// Unrecognized value; falls back to `info`
    Unknown,
}

/// Interpret a `FILESTORE_LOG` value.
pub fn parse_log_setting(value: &str) -> LogSetting {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" => LogSetting::Off,
        "error" => LogSetting::Min(emit::Level::Error),
        "warn" => LogSetting::Min(emit::Level::Warn),
        "info" => LogSetting::Min(emit::Level::Info),
        "debug" => LogSetting::Min(emit::Level::Debug),
        _ => LogSetting::Unknown,
    }
}

/// Initialize diagnostics based on the `FILESTORE_LOG` environment variable
///
/// Safe to call more than once; only the first call installs an emitter.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let raw = std::env::var(LOG_ENV).unwrap_or_default();
        let level = match parse_log_setting(&raw) {
            LogSetting::Off => return,
            LogSetting::Min(level) => level,
            LogSetting::Unknown => emit::Level::Info,
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if parse_log_setting(&raw) == LogSetting::Unknown {
            emit::warn!("unknown {var} value {raw}, using info", var: LOG_ENV, raw: raw.as_str());
        }

        // The emitter lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Completed transfers, commits, deletions
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Individual remote calls, chunk sizing, buffer decisions
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Retries and abort paths
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures that also surface to the caller as errors
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
