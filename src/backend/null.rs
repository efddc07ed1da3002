//! Backend that discards every event.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Eventer, EventerKind, ReadOptions};
use crate::domain::Event;
use crate::error::EventsError;

/// Event logger that records nothing and reads nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventer;

impl NullEventer {
    /// Creates a null eventer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Eventer for NullEventer {
    fn kind(&self) -> EventerKind {
        EventerKind::None
    }

    async fn write(&self, _event: Event) -> Result<(), EventsError> {
        Ok(())
    }

    async fn read(
        &self,
        _options: ReadOptions,
        _sink: mpsc::Sender<Event>,
    ) -> Result<(), EventsError> {
        Ok(())
    }
}
