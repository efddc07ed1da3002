//! Backend construction and selection.
//!
//! [`new_eventer`] maps every [`EventerKind`] to exactly one constructor.
//! Journald is attempted like any other kind; when it reports
//! [`EventsError::NoJournaldLogging`], [`select_eventer`] can fall back to
//! the file log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::journald::new_journald_eventer;
use super::{Eventer, EventerKind, LogFileEventer, MemoryEventer, NullEventer};
use crate::error::EventsError;

/// Default location of the file event log.
pub const DEFAULT_LOGFILE_PATH: &str = "/run/containers/events/events.log";

/// Default rotation threshold for the file event log (1 MiB).
pub const DEFAULT_LOGFILE_MAX_SIZE: u64 = 1024 * 1024;

/// Default number of events retained by the memory backend.
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Default polling interval when following the file log.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Options for constructing an event backend.
///
/// Each backend reads only the fields relevant to it.
#[derive(Debug, Clone)]
pub struct EventerOptions {
    /// Which backend to build.
    pub kind: EventerKind,
    /// File backend: log path.
    pub logfile_path: PathBuf,
    /// File backend: rotation threshold in bytes, zero to disable.
    pub logfile_max_size: u64,
    /// Memory backend: retained events.
    pub memory_capacity: usize,
    /// File backend: follow polling interval.
    pub poll_interval: Duration,
}

impl Default for EventerOptions {
    fn default() -> Self {
        Self {
            kind: EventerKind::File,
            logfile_path: PathBuf::from(DEFAULT_LOGFILE_PATH),
            logfile_max_size: DEFAULT_LOGFILE_MAX_SIZE,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EventerOptions {
    /// Returns default options for the given kind.
    #[must_use]
    pub fn for_kind(kind: EventerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// Builds the backend named by `options.kind`.
///
/// # Errors
///
/// Returns [`EventsError::NoJournaldLogging`] for the journald kind, which
/// this build cannot provide.
pub fn new_eventer(options: &EventerOptions) -> Result<Box<dyn Eventer>, EventsError> {
    match options.kind {
        EventerKind::Journald => new_journald_eventer(options),
        EventerKind::File => Ok(Box::new(LogFileEventer::new(
            options.logfile_path.clone(),
            options.logfile_max_size,
            options.poll_interval,
        ))),
        EventerKind::Memory => Ok(Box::new(MemoryEventer::new(options.memory_capacity))),
        EventerKind::None => Ok(Box::new(NullEventer::new())),
    }
}

/// Builds the configured backend, falling back to the file log when
/// journald is unavailable and `fallback` is set.
///
/// # Errors
///
/// Returns [`EventsError::NoJournaldLogging`] when journald was requested
/// without fallback, or any other constructor error unchanged.
pub fn select_eventer(
    options: &EventerOptions,
    fallback: bool,
) -> Result<Arc<dyn Eventer>, EventsError> {
    let eventer = match new_eventer(options) {
        Ok(eventer) => eventer,
        Err(err) if err.is_no_journald() && fallback => {
            tracing::warn!(
                requested = %options.kind,
                path = %options.logfile_path.display(),
                "journald event logging unavailable, falling back to file"
            );
            new_eventer(&EventerOptions {
                kind: EventerKind::File,
                ..options.clone()
            })?
        }
        Err(err) => return Err(err),
    };
    tracing::info!(backend = %eventer.kind(), "event logger selected");
    Ok(Arc::from(eventer))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn each_kind_builds_matching_backend() {
        for kind in [EventerKind::File, EventerKind::Memory, EventerKind::None] {
            let Ok(eventer) = new_eventer(&EventerOptions::for_kind(kind)) else {
                panic!("{kind} should build");
            };
            assert_eq!(eventer.kind(), kind);
        }
    }

    #[test]
    fn journald_kind_reports_sentinel() {
        let result = new_eventer(&EventerOptions::for_kind(EventerKind::Journald));
        assert!(matches!(result, Err(EventsError::NoJournaldLogging)));
    }

    #[test]
    fn journald_falls_back_to_file() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let options = EventerOptions {
            kind: EventerKind::Journald,
            logfile_path: dir.path().join("events.log"),
            ..EventerOptions::default()
        };
        let Ok(eventer) = select_eventer(&options, true) else {
            panic!("fallback should produce a file backend");
        };
        assert_eq!(eventer.kind(), EventerKind::File);
    }

    #[test]
    fn journald_without_fallback_surfaces_sentinel() {
        let options = EventerOptions::for_kind(EventerKind::Journald);
        let result = select_eventer(&options, false);
        assert!(matches!(result, Err(EventsError::NoJournaldLogging)));
    }

    #[test]
    fn fallback_does_not_change_other_kinds() {
        let options = EventerOptions::for_kind(EventerKind::Memory);
        let Ok(eventer) = select_eventer(&options, true) else {
            panic!("memory should build");
        };
        assert_eq!(eventer.kind(), EventerKind::Memory);
    }

    #[test]
    fn unbounded_memory_capacity_builds() {
        let options = EventerOptions {
            memory_capacity: usize::MAX,
            ..EventerOptions::for_kind(EventerKind::Memory)
        };
        let Ok(eventer) = new_eventer(&options) else {
            panic!("memory should build with any capacity");
        };
        assert_eq!(eventer.kind(), EventerKind::Memory);
    }

    #[test]
    fn defaults() {
        let options = EventerOptions::default();
        assert_eq!(options.kind, EventerKind::File);
        assert_eq!(options.logfile_path, PathBuf::from(DEFAULT_LOGFILE_PATH));
        assert_eq!(options.logfile_max_size, 1_048_576);
    }
}
