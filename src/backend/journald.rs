//! Journald backend constructor for builds without journal integration.
//!
//! This crate carries no systemd journal binding, so the constructor
//! always reports [`EventsError::NoJournaldLogging`]. The factory calls it
//! like every other constructor and decides whether to fall back.

use super::Eventer;
use super::factory::EventerOptions;
use crate::error::EventsError;

/// Always fails with [`EventsError::NoJournaldLogging`].
///
/// `options` is never inspected.
///
/// # Errors
///
/// Always returns [`EventsError::NoJournaldLogging`].
pub fn new_journald_eventer(_options: &EventerOptions) -> Result<Box<dyn Eventer>, EventsError> {
    Err(EventsError::NoJournaldLogging)
}
