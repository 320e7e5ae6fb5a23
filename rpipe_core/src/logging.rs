//! Logging setup for Rural Pipe launchers.
//!
//! Structured logging via the `tracing` crate. The launchers initialize a
//! single subscriber at startup; streamed child output is forwarded through
//! the same sink.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log initialization options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level (default: INFO)
    pub level: Level,

    /// Whether to use JSON format for logs (default: false)
    pub json_format: bool,

    /// Whether to include file and line information (default: false)
    pub include_file_line: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            level: Level::INFO,
            json_format: false,
            include_file_line: false,
        }
    }
}

/// Initialize the global subscriber with the given options. Safe to call
/// more than once in a process; later calls are ignored.
pub fn init_logging(options: LogOptions) {
    let filter = EnvFilter::from_default_env().add_directive(options.level.into());

    let layer = fmt::layer()
        .with_file(options.include_file_line)
        .with_line_number(options.include_file_line)
        .with_target(true);

    if options.json_format {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    }
}

/// Map a level string from configuration or the command line to a `Level`.
/// Unknown strings fall back to INFO.
pub fn level_from_str(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(level_from_str("debug"), Level::DEBUG);
        assert_eq!(level_from_str("WARN"), Level::WARN);
        assert_eq!(level_from_str("verbose"), Level::INFO);
    }
}
