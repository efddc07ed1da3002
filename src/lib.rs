//! # container-events
//!
//! Pluggable event logging for container lifecycle events.
//!
//! Runtime operations (container create/start/died, image pulls, volume
//! and network changes, ...) are recorded as [`domain::Event`]s through an
//! [`backend::Eventer`] chosen at startup. Events can be replayed with
//! filters or followed as a live stream.
//!
//! ## Architecture
//!
//! ```text
//! Runtime operations / CLI
//!     │
//!     ├── EventService (service/)
//!     │
//!     ├── select_eventer (backend/factory)
//!     │       ├── journald  (unavailable in this build)
//!     │       ├── file      JSON lines, rotation, follow
//!     │       ├── memory    bounded history + EventBus
//!     │       └── none
//!     │
//!     └── Event, EventFilter, EventBus (domain/)
//! ```
//!
//! Backends are selected at runtime: [`backend::Capabilities`] picks the
//! default kind for the host, and a journald request on a build without
//! journal support yields [`error::EventsError::NoJournaldLogging`], which
//! the factory can turn into a file-log fallback.

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
