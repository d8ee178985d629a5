// SPDX-License-Identifier: CEPL-1.0
//! Process-wide logging setup.
//!
//! The level is resolved exactly once, at startup, and is read-only after
//! that. Every crate in the workspace logs through `tracing`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

static LEVEL: OnceLock<LogLevel> = OnceLock::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level `{0}` (expected off|error|warn|info|debug or 0-4)")]
pub struct ParseLogLevelError(pub String);

impl LogLevel {
    /// Legacy numeric scale: 0 = off ... 4 = debug, anything higher is debug.
    pub fn from_numeric(n: u32) -> Self {
        match n {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directive())
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u32>() {
            return Ok(LogLevel::from_numeric(n));
        }
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// Installs the global subscriber and freezes the log level.
///
/// `RUST_LOG` wins if set, then `LOG_LEVEL` (name or 0-4), then `default`.
/// Later calls do nothing and return the level already in force.
pub fn init_tracing(default: LogLevel) -> LogLevel {
    use tracing_subscriber::{fmt, EnvFilter};

    if let Some(level) = LEVEL.get() {
        return *level;
    }

    let level = resolve_level(std::env::var("LOG_LEVEL").ok().as_deref(), default);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();

    *LEVEL.get_or_init(|| level)
}

/// Level chosen by [`init_tracing`], or `None` before initialization.
pub fn log_level() -> Option<LogLevel> {
    LEVEL.get().copied()
}

fn resolve_level(env: Option<&str>, default: LogLevel) -> LogLevel {
    match env.map(str::parse::<LogLevel>) {
        Some(Ok(level)) => level,
        Some(Err(e)) => {
            eprintln!("ignoring LOG_LEVEL: {e}");
            default
        }
        None => default,
    }
}
