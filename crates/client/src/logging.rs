//! Diagnostic logging.
//!
//! Thin macros over `tracing` so call sites read the same everywhere in the
//! crate. Lifecycle entries shown to the user live in
//! [`LogBuffer`](crate::ws::LogBuffer); they are mirrored here through
//! [`log_at`].

use crate::ws::LogLevel;

pub fn log_info_impl(msg: &str) {
    tracing::info!(target: "aeiouly_client", "{}", msg);
}

pub fn log_error_impl(msg: &str) {
    tracing::error!(target: "aeiouly_client", "{}", msg);
}

pub fn log_warn_impl(msg: &str) {
    tracing::warn!(target: "aeiouly_client", "{}", msg);
}

pub fn log_debug_impl(msg: &str) {
    tracing::debug!(target: "aeiouly_client", "{}", msg);
}

/// Forward a message at a [`LogLevel`] to the tracing backend.
pub fn log_at(level: LogLevel, msg: &str) {
    match level {
        LogLevel::Info => log_info_impl(msg),
        LogLevel::Warn => log_warn_impl(msg),
        LogLevel::Error => log_error_impl(msg),
    }
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info_impl(&format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error_impl(&format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn_impl(&format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug_impl(&format!($($arg)*))
    };
}
