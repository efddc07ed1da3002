//! Event logger backends and their selection.
//!
//! Every backend implements [`Eventer`]. The factory builds one from
//! [`EventerOptions`]; [`Capabilities`] decides the default kind for the
//! host.

pub mod capability;
pub mod eventer;
pub mod factory;
pub mod journald;
pub mod logfile;
pub mod memory;
pub mod null;

pub use capability::Capabilities;
pub use eventer::{Eventer, EventerKind, ReadOptions};
pub use factory::{EventerOptions, new_eventer, select_eventer};
pub use journald::new_journald_eventer;
pub use logfile::LogFileEventer;
pub use memory::MemoryEventer;
pub use null::NullEventer;
