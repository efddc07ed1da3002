//! Event logging configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable                   | Default                              |
//! |----------------------------|--------------------------------------|
//! | `EVENTS_LOGGER`            | probed: `journald` on systemd hosts, else `file` |
//! | `EVENTS_LOGFILE_PATH`      | `/run/containers/events/events.log`  |
//! | `EVENTS_LOGFILE_MAX_SIZE`  | `1m`                                 |
//! | `EVENTS_FALLBACK`          | `true`                               |
//! | `EVENTS_MEMORY_CAPACITY`   | `10000`                              |
//! | `EVENTS_POLL_INTERVAL_MS`  | `250`                                |
//! | `LOG_FORMAT`               | `text`                               |

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::factory::{
    DEFAULT_LOGFILE_MAX_SIZE, DEFAULT_LOGFILE_PATH, DEFAULT_MEMORY_CAPACITY, DEFAULT_POLL_INTERVAL,
};
use crate::backend::{Capabilities, EventerKind, EventerOptions};
use crate::error::EventsError;

/// Output format of the process's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level event logging configuration.
///
/// Loaded once at startup via [`EventsConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EventsConfig {
    /// Which backend to use.
    pub logger: EventerKind,

    /// Path of the file event log.
    pub logfile_path: PathBuf,

    /// Rotation threshold for the file log in bytes, zero to disable.
    pub logfile_max_size: u64,

    /// Fall back to the file log when journald is unavailable.
    pub fallback: bool,

    /// Events retained by the memory backend.
    pub memory_capacity: usize,

    /// Polling interval when following the file log.
    pub poll_interval: Duration,

    /// Diagnostics output format.
    pub log_format: LogFormat,
}

impl EventsConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// When `EVENTS_LOGGER` is unset the host is probed for the default.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::UnknownEventerType`] if `EVENTS_LOGGER` names
    /// an unknown backend, or [`EventsError::InvalidConfig`] if
    /// `LOG_FORMAT` is neither `text` nor `json`.
    pub fn from_env() -> Result<Self, EventsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), &Capabilities::detect())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`EventsConfig::from_env`].
    pub fn from_lookup<F>(lookup: F, capabilities: &Capabilities) -> Result<Self, EventsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let logger = match lookup("EVENTS_LOGGER") {
            Some(name) if !name.trim().is_empty() => name.parse()?,
            _ => capabilities.default_kind(),
        };

        let logfile_path = lookup("EVENTS_LOGFILE_PATH")
            .filter(|p| !p.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_LOGFILE_PATH), PathBuf::from);

        let logfile_max_size = lookup("EVENTS_LOGFILE_MAX_SIZE")
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_LOGFILE_MAX_SIZE);

        let fallback = parse_bool(lookup("EVENTS_FALLBACK").as_deref(), true);
        let memory_capacity = parse_or(lookup("EVENTS_MEMORY_CAPACITY"), DEFAULT_MEMORY_CAPACITY);
        let poll_interval = lookup("EVENTS_POLL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(v) if v.is_empty() || v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(EventsError::InvalidConfig(format!(
                    "LOG_FORMAT must be \"text\" or \"json\", got {other:?}"
                )));
            }
        };

        Ok(Self {
            logger,
            logfile_path,
            logfile_max_size,
            fallback,
            memory_capacity,
            poll_interval,
            log_format,
        })
    }

    /// Returns backend construction options for this configuration.
    #[must_use]
    pub fn eventer_options(&self) -> EventerOptions {
        EventerOptions {
            kind: self.logger,
            logfile_path: self.logfile_path.clone(),
            logfile_max_size: self.logfile_max_size,
            memory_capacity: self.memory_capacity,
            poll_interval: self.poll_interval,
        }
    }
}

/// Parses `value` as `T`, returning `default` on missing or invalid input.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

/// Parses a byte size such as `4096`, `512k`, `1m`, `1MB` or `2g`
/// (binary multiples).
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_lowercase();
    let digits = value.bytes().take_while(u8::is_ascii_digit).count();
    let (number, unit) = value.split_at(digits);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim().trim_end_matches(['b', 'i']) {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        _ => return None,
    };
    number.checked_mul(multiplier)
}
