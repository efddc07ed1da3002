//! In-process event backend.
//!
//! [`MemoryEventer`] keeps a bounded history in memory and republishes
//! each write on an [`EventBus`] so streaming readers see it immediately.
//! Nothing survives the process.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast, mpsc};

use super::eventer::{deliver, wait_until};
use super::{Eventer, EventerKind, ReadOptions};
use crate::domain::{Event, EventBus};
use crate::error::EventsError;

/// Bounded in-memory event log with live broadcast.
///
/// # Concurrency
///
/// Writes hold the history write lock while publishing, and readers
/// subscribe while holding the read lock, so a streaming reader sees each
/// event exactly once: either in its history snapshot or on the bus.
#[derive(Debug)]
pub struct MemoryEventer {
    history: RwLock<VecDeque<Event>>,
    capacity: usize,
    bus: EventBus,
}

impl MemoryEventer {
    /// Creates a memory eventer keeping at most `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            bus: EventBus::new(capacity),
        }
    }

    /// Returns the number of events currently retained.
    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Returns `true` if no events are retained.
    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }

    /// Returns the bus carrying live writes.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[async_trait]
impl Eventer for MemoryEventer {
    fn kind(&self) -> EventerKind {
        EventerKind::Memory
    }

    async fn write(&self, event: Event) -> Result<(), EventsError> {
        let mut history = self.history.write().await;
        if history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
        self.bus.publish(event);
        Ok(())
    }

    async fn read(
        &self,
        options: ReadOptions,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EventsError> {
        let filter = options.compile()?;

        let (snapshot, live) = {
            let history = self.history.read().await;
            let live = options.stream.then(|| self.bus.subscribe());
            let snapshot: Vec<Event> = if options.replays_history() {
                history.iter().filter(|e| filter.matches(e)).cloned().collect()
            } else {
                Vec::new()
            };
            (snapshot, live)
        };

        for event in snapshot {
            if !deliver(&sink, event).await {
                return Ok(());
            }
        }

        let Some(mut live) = live else {
            return Ok(());
        };

        let deadline = wait_until(filter.until());
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = sink.closed() => return Ok(()),
                () = &mut deadline => return Ok(()),
                received = live.recv() => match received {
                    Ok(event) => {
                        if filter.matches(&event) && !deliver(&sink, event).await {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "event stream lagged behind memory backend");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::{EventType, Status};

    fn container(name: &str, status: Status) -> Event {
        Event::new(EventType::Container, status)
            .with_id(format!("{name}-id"))
            .with_name(name)
    }

    async fn collect(eventer: &MemoryEventer, options: ReadOptions) -> Vec<Event> {
        let (tx, mut rx) = mpsc::channel(64);
        let Ok(()) = eventer.read(options, tx).await else {
            panic!("read failed");
        };
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn history_is_replayed_in_order() {
        let eventer = MemoryEventer::new(10);
        for name in ["a", "b", "c"] {
            let _ = eventer.write(container(name, Status::Create)).await;
        }
        let events = collect(&eventer, ReadOptions::history()).await;
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn capacity_drops_oldest() {
        let eventer = MemoryEventer::new(2);
        for name in ["a", "b", "c"] {
            let _ = eventer.write(container(name, Status::Create)).await;
        }
        assert_eq!(eventer.len().await, 2);
        let events = collect(&eventer, ReadOptions::history()).await;
        assert_eq!(events.first().map(|e| e.name.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn filters_apply_to_history() {
        let eventer = MemoryEventer::new(10);
        let _ = eventer.write(container("web", Status::Start)).await;
        let _ = eventer.write(container("db", Status::Start)).await;
        let _ = eventer.write(container("web", Status::Stop)).await;

        let options = ReadOptions::history()
            .with_filter("container=web")
            .with_filter("event=stop");
        let events = collect(&eventer, options).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(|e| e.status), Some(Status::Stop));
    }

    #[tokio::test]
    async fn stream_delivers_new_events_and_stops_on_drop() {
        let eventer = Arc::new(MemoryEventer::new(10));
        let _ = eventer.write(container("old", Status::Create)).await;

        let (tx, mut rx) = mpsc::channel(8);
        let reader = {
            let eventer = Arc::clone(&eventer);
            tokio::spawn(async move { eventer.read(ReadOptions::follow(), tx).await })
        };

        while eventer.bus().receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        let _ = eventer.write(container("new", Status::Start)).await;

        let Some(event) = rx.recv().await else {
            panic!("expected streamed event");
        };
        assert_eq!(event.name, "new");

        drop(rx);
        let Ok(result) = tokio::time::timeout(Duration::from_secs(5), reader).await else {
            panic!("reader did not stop after receiver drop");
        };
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn stream_ends_at_until() {
        let eventer = MemoryEventer::new(10);
        let options = ReadOptions {
            until: Some((chrono::Utc::now() + chrono::Duration::milliseconds(50)).to_rfc3339()),
            ..ReadOptions::follow()
        };
        let result = tokio::time::timeout(Duration::from_secs(5), collect(&eventer, options)).await;
        assert!(matches!(result, Ok(events) if events.is_empty()));
    }

    #[tokio::test]
    async fn invalid_filter_is_an_error() {
        let eventer = MemoryEventer::new(10);
        let (tx, _rx) = mpsc::channel(1);
        let result = eventer.read(ReadOptions::history().with_filter("bad"), tx).await;
        assert!(matches!(result, Err(EventsError::InvalidFilter(_))));
    }

    #[tokio::test]
    async fn huge_capacity_keeps_full_history() {
        let eventer = MemoryEventer::new(usize::MAX);
        for i in 0..2_000 {
            let _ = eventer.write(container(&format!("c{i}"), Status::Create)).await;
        }
        assert_eq!(eventer.len().await, 2_000);
        let events = collect(&eventer, ReadOptions::history()).await;
        assert_eq!(events.first().map(|e| e.name.as_str()), Some("c0"));
    }
}
