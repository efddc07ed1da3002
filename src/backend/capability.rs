//! Host capability probe used to pick a default event logger.
//!
//! Selection happens at startup from probed flags instead of per-platform
//! compilation: every constructor is always built, and [`Capabilities`]
//! only decides which kind to try first.

use std::path::Path;

use super::EventerKind;

/// Directory that exists only when the host was booted by systemd.
pub const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

/// Platform features relevant to event logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The host was booted with systemd as init.
    pub systemd_booted: bool,
    /// This build can talk to the systemd journal.
    pub journald_integration: bool,
}

impl Capabilities {
    /// Probes the running host.
    #[must_use]
    pub fn detect() -> Self {
        Self::probe(Path::new(SYSTEMD_RUNTIME_DIR))
    }

    /// Probes using an explicit systemd runtime directory.
    #[must_use]
    pub fn probe(systemd_dir: &Path) -> Self {
        let caps = Self {
            systemd_booted: systemd_dir.is_dir(),
            journald_integration: false,
        };
        tracing::debug!(
            systemd_booted = caps.systemd_booted,
            journald_integration = caps.journald_integration,
            "probed event logging capabilities"
        );
        caps
    }

    /// Returns the logger the runtime uses when none is configured:
    /// journald on systemd hosts, the file log elsewhere.
    #[must_use]
    pub const fn default_kind(&self) -> EventerKind {
        if self.systemd_booted {
            EventerKind::Journald
        } else {
            EventerKind::File
        }
    }

    /// Returns `true` if a backend of `kind` can be constructed here.
    #[must_use]
    pub const fn supports(&self, kind: EventerKind) -> bool {
        match kind {
            EventerKind::Journald => self.systemd_booted && self.journald_integration,
            EventerKind::File | EventerKind::Memory | EventerKind::None => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn systemd_host_defaults_to_journald() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let caps = Capabilities::probe(dir.path());
        assert!(caps.systemd_booted);
        assert_eq!(caps.default_kind(), EventerKind::Journald);
    }

    #[test]
    fn non_systemd_host_defaults_to_file() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let caps = Capabilities::probe(&dir.path().join("missing"));
        assert!(!caps.systemd_booted);
        assert_eq!(caps.default_kind(), EventerKind::File);
    }

    #[test]
    fn journald_is_never_supported_in_this_build() {
        let caps = Capabilities {
            systemd_booted: true,
            journald_integration: false,
        };
        assert!(!caps.supports(EventerKind::Journald));
        assert!(caps.supports(EventerKind::File));
        assert!(caps.supports(EventerKind::Memory));
        assert!(caps.supports(EventerKind::None));
        assert!(!Capabilities::detect().journald_integration);
    }
}
