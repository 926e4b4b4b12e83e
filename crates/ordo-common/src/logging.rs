//! Logging initialisation
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a formatting layer.
//! Override the level with `ORDO_LOG_LEVEL` (any `EnvFilter` directive).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_DIRECTIVE: &str = "info";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `ordo_lock=debug`
    pub directive: String,
    /// Emit ANSI colours
    pub ansi: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let directive =
            std::env::var("ORDO_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_DIRECTIVE.to_string());
        let ansi = std::env::var("ORDO_LOG_ANSI")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        Self {
            directive,
            ansi,
            ..Default::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.directive).unwrap_or_else(|e| {
            eprintln!(
                "invalid log directive '{}' ({}), falling back to '{}'",
                self.directive, e, DEFAULT_DIRECTIVE
            );
            EnvFilter::new(DEFAULT_DIRECTIVE)
        })
    }
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, which makes this
/// safe to call from every test.
pub fn init_logging(config: &LoggingConfig) -> bool {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(
            fmt::layer()
                .with_ansi(config.ansi)
                .with_target(config.with_target),
        )
        .try_init()
        .is_ok()
}
