//! Event service: typed event emission and queries over any backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{Eventer, ReadOptions};
use crate::domain::{Event, EventType, Status};
use crate::error::EventsError;

/// Buffer size of channels handed to backend reads.
const READ_BUFFER: usize = 256;

/// Orchestration layer between runtime operations and the event backend.
///
/// The `*_event` methods are best-effort: a failed write is logged and
/// never fails the operation that produced the event. Use
/// [`EventService::write`] when the caller must know.
#[derive(Debug, Clone)]
pub struct EventService {
    eventer: Arc<dyn Eventer>,
}

impl EventService {
    /// Creates a new `EventService` over the given backend.
    #[must_use]
    pub fn new(eventer: Arc<dyn Eventer>) -> Self {
        Self { eventer }
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn eventer(&self) -> &Arc<dyn Eventer> {
        &self.eventer
    }

    /// Writes an event, propagating failure.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`EventsError`].
    pub async fn write(&self, event: Event) -> Result<(), EventsError> {
        self.eventer.write(event).await
    }

    async fn emit(&self, event: Event) {
        let event_type = event.event_type;
        let status = event.status;
        if let Err(err) = self.eventer.write(event).await {
            tracing::error!(%event_type, %status, error = %err, "unable to write event");
        }
    }

    /// Records a container event carrying the container's labels.
    pub async fn container_event(
        &self,
        status: Status,
        id: &str,
        name: &str,
        image: &str,
        attributes: BTreeMap<String, String>,
    ) {
        let mut event = Event::new(EventType::Container, status)
            .with_id(id)
            .with_name(name)
            .with_image(image);
        event.attributes = attributes;
        self.emit(event).await;
    }

    /// Records a container `died` event with the process exit code.
    pub async fn container_exit_event(&self, id: &str, name: &str, image: &str, exit_code: i32) {
        let mut event = Event::new(EventType::Container, Status::Died)
            .with_id(id)
            .with_name(name)
            .with_image(image);
        event.container_exit_code = Some(exit_code);
        self.emit(event).await;
    }

    /// Records a pod event.
    pub async fn pod_event(&self, status: Status, id: &str, name: &str) {
        self.emit(Event::new(EventType::Pod, status).with_id(id).with_name(name))
            .await;
    }

    /// Records an image event.
    pub async fn image_event(&self, status: Status, id: &str, name: &str) {
        self.emit(Event::new(EventType::Image, status).with_id(id).with_name(name))
            .await;
    }

    /// Records a volume event.
    pub async fn volume_event(&self, status: Status, name: &str) {
        self.emit(Event::new(EventType::Volume, status).with_name(name))
            .await;
    }

    /// Records a network event for a container joining or leaving a network.
    pub async fn network_event(&self, status: Status, container_id: &str, network: &str) {
        let mut event = Event::new(EventType::Network, status).with_id(container_id);
        event.network = network.to_string();
        self.emit(event).await;
    }

    /// Records a runtime-wide event.
    pub async fn system_event(&self, status: Status) {
        self.emit(Event::new(EventType::System, status)).await;
    }

    /// Collects all events matching `options`.
    ///
    /// Streaming is disabled regardless of `options.stream`.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`EventsError`].
    pub async fn events(&self, options: ReadOptions) -> Result<Vec<Event>, EventsError> {
        let options = ReadOptions {
            stream: false,
            ..options
        };
        let (tx, mut rx) = mpsc::channel(READ_BUFFER);
        let eventer = Arc::clone(&self.eventer);
        let reader = tokio::spawn(async move { eventer.read(options, tx).await });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        reader
            .await
            .map_err(|e| EventsError::Internal(format!("event reader task failed: {e}")))??;
        Ok(events)
    }

    /// Starts a read on the runtime and returns the receiving end.
    ///
    /// The read stops when the receiver is dropped. Read errors are logged.
    #[must_use]
    pub fn stream(&self, options: ReadOptions) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(READ_BUFFER);
        let eventer = Arc::clone(&self.eventer);
        tokio::spawn(async move {
            if let Err(err) = eventer.read(options, tx).await {
                tracing::error!(error = %err, "event stream ended with error");
            }
        });
        rx
    }

    /// Returns the newest container event with `status` for the container
    /// named or identified by `name_or_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::EventNotFound`] if no such event exists, or
    /// the backend's error.
    pub async fn last_container_event(
        &self,
        name_or_id: &str,
        status: Status,
    ) -> Result<Event, EventsError> {
        let options = ReadOptions::history()
            .with_filter(format!("container={name_or_id}"))
            .with_filter(format!("event={status}"))
            .with_filter("type=container");
        self.events(options)
            .await?
            .pop()
            .ok_or_else(|| {
                EventsError::EventNotFound(format!("{status} event for container {name_or_id}"))
            })
    }
}
