//! Event subsystem error types.
//!
//! [`EventsError`] is the central error type for every backend, filter and
//! configuration failure. Each variant maps to a numeric code so callers
//! (and the CLI) can report failures uniformly.

use std::path::PathBuf;

/// Errors raised by the event subsystem.
///
/// # Error Code Ranges
///
/// | Range     | Category                     |
/// |-----------|------------------------------|
/// | 1000–1999 | Invalid input                |
/// | 2000–2999 | Not found / not available    |
/// | 3000–3999 | I/O and internal failures    |
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// This build or platform has no journald integration.
    ///
    /// Permanent: callers should select a different backend instead of
    /// retrying.
    #[error("no support for journald logging")]
    NoJournaldLogging,

    /// The configured events logger name is not one of the known kinds.
    #[error("unknown event logger type: {0:?}")]
    UnknownEventerType(String),

    /// A filter string could not be parsed.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A `since`/`until` value could not be parsed as a point in time.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// An unknown event status string.
    #[error("invalid event status: {0:?}")]
    InvalidStatus(String),

    /// An unknown event type string.
    #[error("invalid event type: {0:?}")]
    InvalidEventType(String),

    /// A stored event could not be decoded.
    #[error("invalid event at line {line}: {message}")]
    InvalidEvent {
        /// One-based line number within the log, `0` when not read from a log.
        line: usize,
        /// The underlying decode error.
        message: String,
    },

    /// Configuration value present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No event matched a lookup.
    #[error("no matching event found: {0}")]
    EventNotFound(String),

    /// I/O failure on the event log.
    #[error("event log I/O error at {}: {source}", .path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure without an associated path.
    #[error("I/O error: {0}")]
    IoUnknownPath(#[from] std::io::Error),

    /// Event serialisation failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EventsError {
    /// Wraps an [`std::io::Error`] together with the path it concerns.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::UnknownEventerType(_) => 1001,
            Self::InvalidFilter(_) => 1002,
            Self::InvalidTimestamp(_) => 1003,
            Self::InvalidStatus(_) => 1004,
            Self::InvalidEventType(_) => 1005,
            Self::InvalidEvent { .. } => 1006,
            Self::InvalidConfig(_) => 1007,
            Self::NoJournaldLogging => 2001,
            Self::EventNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Io { .. } | Self::IoUnknownPath(_) => 3001,
            Self::Serialization(_) => 3002,
        }
    }

    /// Returns `true` when the failure reflects a missing capability of
    /// this build or platform rather than a runtime condition.
    #[must_use]
    pub const fn is_capability_unavailable(&self) -> bool {
        matches!(self, Self::NoJournaldLogging)
    }

    /// Returns `true` for the journald-unavailable sentinel.
    #[must_use]
    pub const fn is_no_journald(&self) -> bool {
        matches!(self, Self::NoJournaldLogging)
    }

    /// Returns `true` if repeating the operation might succeed.
    ///
    /// Only I/O failures qualify; input errors and missing capabilities
    /// are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::IoUnknownPath(_))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn journald_sentinel_is_permanent() {
        let err = EventsError::NoJournaldLogging;
        assert!(err.is_no_journald());
        assert!(err.is_capability_unavailable());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), 2001);
        assert_eq!(err.to_string(), "no support for journald logging");
    }

    #[test]
    fn io_error_is_retryable() {
        let err = EventsError::io(
            "/tmp/events.log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_retryable());
        assert!(!err.is_capability_unavailable());
        assert!(err.to_string().contains("/tmp/events.log"));
    }

    #[test]
    fn input_errors_use_1xxx_codes() {
        let codes = [
            EventsError::UnknownEventerType("x".into()).error_code(),
            EventsError::InvalidFilter("x".into()).error_code(),
            EventsError::InvalidTimestamp("x".into()).error_code(),
            EventsError::InvalidStatus("x".into()).error_code(),
        ];
        assert!(codes.iter().all(|c| (1000..2000).contains(c)));
    }
}
