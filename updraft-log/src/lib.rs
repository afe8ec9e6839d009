//! Updraft Logging Setup
//!
//! Installs a `tracing` subscriber for applications built on Updraft. The
//! library crates themselves only emit `tracing` events; this crate decides
//! where those events go and at which level, based on environment variables.
//!
//! # Usage
//!
//! ```rust,no_run
//! // Reads UPDRAFT_* variables and installs a global subscriber.
//! updraft_log::init();
//!
//! tracing::info!(group_id = 42, "callback server starting");
//! ```
//!
//! # Environment Variables
//!
//! - `UPDRAFT_DEBUG=1` - Enable debug logging
//! - `UPDRAFT_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `UPDRAFT_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `UPDRAFT_LOG_COLOR=1|0` - Enable/disable ANSI colors
//! - `RUST_LOG` - Overrides the level with a full `EnvFilter` directive

use once_cell::sync::Lazy;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of events that reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human friendly
    Pretty,
    /// Single-line
    Compact,
    /// One JSON object per line
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static INSTALLED: AtomicBool = AtomicBool::new(false);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled
    pub color: bool,
    /// Whether to include the event target (module path)
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            target: true,
        }
    }
}

impl LogConfig {
    /// Build the configuration from `UPDRAFT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        let debug = flag("UPDRAFT_DEBUG").unwrap_or(false);

        let level = lookup("UPDRAFT_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("UPDRAFT_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("UPDRAFT_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let target = flag("UPDRAFT_LOG_TARGET").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
            target,
        }
    }

    /// Filter for this configuration. `RUST_LOG` wins when it is set.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Get the configuration read from the environment.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the global subscriber from the environment configuration.
///
/// Calling this more than once is harmless; only the first call installs.
pub fn init() {
    init_with(config().clone());
}

/// Install the global subscriber from an explicit configuration.
///
/// Returns `false` when a subscriber was already installed, either by an
/// earlier call or by the host application.
pub fn init_with(config: LogConfig) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let filter = config.filter();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        Format::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.color)
                    .with_target(config.target),
            )
            .try_init(),
        Format::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(config.color)
                    .with_target(config.target),
            )
            .try_init(),
        #[cfg(feature = "json")]
        Format::Json => registry
            .with(fmt::layer().json().with_target(config.target))
            .try_init(),
        #[cfg(not(feature = "json"))]
        Format::Json => registry
            .with(fmt::layer().compact().with_target(config.target))
            .try_init(),
    };

    installed.is_ok()
}

/// Whether `init` or `init_with` has already run in this process.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

// ============================================================================
// Tests
// ============================================================================
