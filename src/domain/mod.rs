//! Domain layer: event model, filters, and the in-process event bus.

pub mod event;
pub mod event_bus;
pub mod filter;

pub use event::{Event, EventType, Status};
pub use event_bus::EventBus;
pub use filter::EventFilter;
