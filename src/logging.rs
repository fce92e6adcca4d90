//! Tracing subscriber setup for the command-line binary

use tracing::Level;

pub const ENV_LOG_LEVEL: &str = "SPACE_MIGRATOR_LOG";

/// Map `-v` occurrences to a level: none = warn, 1 = info, 2 = debug, 3+ = trace
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn parse_level(raw: &str) -> Option<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global fmt subscriber on stderr.
///
/// A non-zero verbosity wins over `SPACE_MIGRATOR_LOG`. Calling this twice
/// is harmless; the second subscriber is simply not installed.
pub fn init(verbosity: u8) {
    let from_env = std::env::var(ENV_LOG_LEVEL)
        .ok()
        .and_then(|v| parse_level(&v));
    let level = match (verbosity, from_env) {
        (0, Some(level)) => level,
        (v, _) => level_for_verbosity(v),
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
