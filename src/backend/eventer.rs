//! The backend contract shared by every event logger.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::{Event, EventFilter};
use crate::error::EventsError;

/// The closed set of event logger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventerKind {
    /// The systemd journal.
    Journald,
    /// A JSON-lines append log on disk.
    File,
    /// An in-process buffer, mostly for tests.
    Memory,
    /// Discards everything.
    None,
}

impl EventerKind {
    /// Every kind, in the order the factory knows them.
    pub const ALL: [Self; 4] = [Self::Journald, Self::File, Self::Memory, Self::None];

    /// Returns the configuration name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Journald => "journald",
            Self::File => "file",
            Self::Memory => "memory",
            Self::None => "none",
        }
    }
}

impl fmt::Display for EventerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventerKind {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| EventsError::UnknownEventerType(s.to_string()))
    }
}

/// Options for a single read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// `key=value` filter strings.
    pub filters: Vec<String>,
    /// Only events after this time.
    pub since: Option<String>,
    /// Only events before this time; also ends a stream once passed.
    pub until: Option<String>,
    /// Keep delivering new events after history is exhausted.
    pub stream: bool,
    /// When streaming, replay history first instead of starting at the end.
    pub from_start: bool,
}

impl ReadOptions {
    /// Returns options for a one-shot read of all history.
    #[must_use]
    pub fn history() -> Self {
        Self::default()
    }

    /// Returns options that follow new events only.
    #[must_use]
    pub fn follow() -> Self {
        Self {
            stream: true,
            ..Self::default()
        }
    }

    /// Adds a `key=value` filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Returns `true` if existing events must be delivered.
    #[must_use]
    pub const fn replays_history(&self) -> bool {
        !self.stream || self.from_start
    }

    /// Compiles the filters and time bounds.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::InvalidFilter`] or
    /// [`EventsError::InvalidTimestamp`] for malformed input.
    pub fn compile(&self) -> Result<EventFilter, EventsError> {
        EventFilter::from_options(&self.filters, self.since.as_deref(), self.until.as_deref())
    }
}

/// An event logger backend.
///
/// Backends are shared across tasks; `write` may be called concurrently
/// with any number of readers.
#[async_trait]
pub trait Eventer: Send + Sync + fmt::Debug {
    /// Returns which kind of backend this is.
    fn kind(&self) -> EventerKind;

    /// Records an event.
    ///
    /// # Errors
    ///
    /// Returns an [`EventsError`] if the event cannot be persisted.
    async fn write(&self, event: Event) -> Result<(), EventsError>;

    /// Sends every event matching `options` into `sink`, in log order.
    ///
    /// Returns once history is exhausted (non-streaming reads), once the
    /// `until` bound has passed, or once the receiving side of `sink` has
    /// been dropped.
    ///
    /// # Errors
    ///
    /// Returns an [`EventsError`] for invalid filters or unreadable logs.
    async fn read(&self, options: ReadOptions, sink: mpsc::Sender<Event>)
    -> Result<(), EventsError>;
}

/// Sends `event` into `sink`. Returns `false` once the receiver is gone.
pub(crate) async fn deliver(sink: &mpsc::Sender<Event>, event: Event) -> bool {
    sink.send(event).await.is_ok()
}

/// Completes once the wall clock passes `until`; never completes for `None`.
pub(crate) async fn wait_until(until: Option<DateTime<Utc>>) {
    match until {
        Some(deadline) => {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending::<()>().await,
    }
}
