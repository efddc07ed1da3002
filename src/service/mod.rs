//! Service layer: event emission and query orchestration.
//!
//! [`EventService`] turns runtime operations into typed events and answers
//! replay queries through whichever [`crate::backend::Eventer`] was selected.

pub mod event_service;

pub use event_service::EventService;
