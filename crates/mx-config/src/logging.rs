//! Diagnostic tracing for mx components.
//!
//! This is the internal event stream (signal delivery, liveness checks,
//! filesystem recovery). User-facing output goes through the console
//! reporter in `mx-system` instead.
//!
//! # Usage
//!
//! ```ignore
//! use mx_config::log_process_debug;
//!
//! log_process_debug!("Sending signal", pid = 1234, signal = "SIGTERM");
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const PROCESS: &'static str = "PROCESS";
    pub const IO: &'static str = "IO";
    pub const CONSOLE: &'static str = "CONSOLE";
    pub const ABORT: &'static str = "ABORT";
    pub const CLI: &'static str = "CLI";
}

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "MX_LOG";

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// === PROCESS logging macros ===

#[macro_export]
macro_rules! log_process_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::PROCESS, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_process_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::PROCESS, $($key = $value,)* $msg)
    };
}

// === IO logging macros ===

#[macro_export]
macro_rules! log_io_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::IO, $($key = $value,)* $msg)
    };
}

// === CONSOLE logging macros ===

#[macro_export]
macro_rules! log_console_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CONSOLE, $($key = $value,)* $msg)
    };
}

// === ABORT logging macros ===

#[macro_export]
macro_rules! log_abort_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::ABORT, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_abort_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::ABORT, $($key = $value,)* $msg)
    };
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CLI, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `MX_LOG` takes precedence over `RUST_LOG`, which takes precedence over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
