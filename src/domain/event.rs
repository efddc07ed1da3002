//! Lifecycle events recorded by the event backends.
//!
//! An [`Event`] is written as one JSON object per line by the file backend,
//! kept verbatim by the memory backend, and rendered either as JSON or as a
//! single human-readable line by the CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventsError;

/// Number of ID characters kept when truncating for display.
pub const SHORT_ID_LEN: usize = 12;

/// The kind of object an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum EventType {
    /// A container.
    Container,
    /// An image.
    Image,
    /// A virtual machine used to host containers.
    Machine,
    /// A network.
    Network,
    /// A pod.
    Pod,
    /// The runtime itself.
    System,
    /// A volume.
    Volume,
}

impl EventType {
    /// Every event type, in display order.
    pub const ALL: [Self; 7] = [
        Self::Container,
        Self::Image,
        Self::Machine,
        Self::Network,
        Self::Pod,
        Self::System,
        Self::Volume,
    ];

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
            Self::Machine => "machine",
            Self::Network => "network",
            Self::Pod => "pod",
            Self::System => "system",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EventsError::InvalidEventType(s.to_string()))
    }
}

impl TryFrom<String> for EventType {
    type Error = EventsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventType> for &'static str {
    fn from(value: EventType) -> Self {
        value.as_str()
    }
}

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Status {
    /// Attached to a container.
    Attach,
    /// Container checkpointed.
    Checkpoint,
    /// Container cleaned up after exit.
    Cleanup,
    /// Container committed to an image.
    Commit,
    /// Container connected to a network.
    Connect,
    /// Object created.
    Create,
    /// Container process died.
    Died,
    /// Container disconnected from a network.
    Disconnect,
    /// Exec session started.
    Exec,
    /// Exec session process died.
    ExecDied,
    /// Container exited.
    Exited,
    /// Container exported.
    Export,
    /// Healthcheck result recorded.
    HealthStatus,
    /// Image imported.
    Import,
    /// Container initialised.
    Init,
    /// Container signalled.
    Kill,
    /// Image loaded from an archive.
    LoadFromArchive,
    /// The event log was rotated.
    LogRotation,
    /// Container storage mounted.
    Mount,
    /// Container paused.
    Pause,
    /// Object pruned.
    Prune,
    /// Image pulled.
    Pull,
    /// Image pull failed.
    PullError,
    /// Image pushed.
    Push,
    /// Runtime state refreshed.
    Refresh,
    /// Object removed.
    Remove,
    /// Container renamed.
    Rename,
    /// Locks renumbered.
    Renumber,
    /// Container restarted.
    Restart,
    /// Container restored from a checkpoint.
    Restore,
    /// Image saved.
    Save,
    /// Object started.
    Start,
    /// Object stopped.
    Stop,
    /// Container state synced.
    Sync,
    /// Image tagged.
    Tag,
    /// Container storage unmounted.
    Unmount,
    /// Container unpaused.
    Unpause,
    /// Image untagged.
    Untag,
    /// Container resources updated.
    Update,
}

impl Status {
    /// Every status, in alphabetical order of their wire names.
    pub const ALL: [Self; 39] = [
        Self::Attach,
        Self::Checkpoint,
        Self::Cleanup,
        Self::Commit,
        Self::Connect,
        Self::Create,
        Self::Died,
        Self::Disconnect,
        Self::Exec,
        Self::ExecDied,
        Self::Exited,
        Self::Export,
        Self::HealthStatus,
        Self::Import,
        Self::Init,
        Self::Kill,
        Self::LoadFromArchive,
        Self::LogRotation,
        Self::Mount,
        Self::Pause,
        Self::Prune,
        Self::Pull,
        Self::PullError,
        Self::Push,
        Self::Refresh,
        Self::Remove,
        Self::Rename,
        Self::Renumber,
        Self::Restart,
        Self::Restore,
        Self::Save,
        Self::Start,
        Self::Stop,
        Self::Sync,
        Self::Tag,
        Self::Unmount,
        Self::Unpause,
        Self::Untag,
        Self::Update,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Attach => "attach",
            Self::Checkpoint => "checkpoint",
            Self::Cleanup => "cleanup",
            Self::Commit => "commit",
            Self::Connect => "connect",
            Self::Create => "create",
            Self::Died => "died",
            Self::Disconnect => "disconnect",
            Self::Exec => "exec",
            Self::ExecDied => "exec_died",
            Self::Exited => "exited",
            Self::Export => "export",
            Self::HealthStatus => "health_status",
            Self::Import => "import",
            Self::Init => "init",
            Self::Kill => "kill",
            Self::LoadFromArchive => "loadfromarchive",
            Self::LogRotation => "log-rotation",
            Self::Mount => "mount",
            Self::Pause => "pause",
            Self::Prune => "prune",
            Self::Pull => "pull",
            Self::PullError => "pull-error",
            Self::Push => "push",
            Self::Refresh => "refresh",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Renumber => "renumber",
            Self::Restart => "restart",
            Self::Restore => "restore",
            Self::Save => "save",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Sync => "sync",
            Self::Tag => "tag",
            Self::Unmount => "unmount",
            Self::Unpause => "unpause",
            Self::Untag => "untag",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = EventsError;

    /// Parses a wire name. `die` is accepted as an alias of `died`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower == "die" {
            return Ok(Self::Died);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| EventsError::InvalidStatus(s.to_string()))
    }
}

impl TryFrom<String> for Status {
    type Error = EventsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Status> for &'static str {
    fn from(value: Status) -> Self {
        value.as_str()
    }
}

/// A single lifecycle event.
///
/// Serialises with the PascalCase keys used by the on-disk log format;
/// empty strings, empty maps and absent exit codes are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Exit code of the container process, for `died` events.
    #[serde(
        rename = "ContainerExitCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub container_exit_code: Option<i32>,

    /// Object ID (container, pod, image, ...).
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Image name associated with the object.
    #[serde(rename = "Image", default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Object name.
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Network name, for network events.
    #[serde(rename = "Network", default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    /// What happened.
    #[serde(rename = "Status")]
    pub status: Status,

    /// When it happened.
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,

    /// The kind of object.
    #[serde(rename = "Type")]
    pub event_type: EventType,

    /// Healthcheck result, for `health_status` events.
    #[serde(
        rename = "HealthStatus",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub health_status: String,

    /// ID of the pod the container belongs to.
    #[serde(rename = "PodID", default, skip_serializing_if = "String::is_empty")]
    pub pod_id: String,

    /// Free-form attributes, usually the object's labels.
    #[serde(
        rename = "Attributes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Creates an event of the given type and status stamped with the
    /// current time. All other fields are empty.
    #[must_use]
    pub fn new(event_type: EventType, status: Status) -> Self {
        Self {
            container_exit_code: None,
            id: String::new(),
            image: String::new(),
            name: String::new(),
            network: String::new(),
            status,
            time: Utc::now(),
            event_type,
            health_status: String::new(),
            pod_id: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the object ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the object name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the image name.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Adds a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Encodes the event as a single-line JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::Serialization`] if encoding fails.
    pub fn to_json_string(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an event from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::InvalidEvent`] if the input is not a valid
    /// event, including unknown types or statuses.
    pub fn from_json_str(s: &str) -> Result<Self, EventsError> {
        serde_json::from_str(s).map_err(|e| EventsError::InvalidEvent {
            line: 0,
            message: e.to_string(),
        })
    }

    /// Renders the event as one human-readable line.
    ///
    /// With `truncate` set, IDs are shortened to [`SHORT_ID_LEN`] characters.
    #[must_use]
    pub fn to_human_readable(&self, truncate: bool) -> String {
        let id = if truncate {
            short_id(&self.id)
        } else {
            &self.id
        };
        let time = self.time.format("%Y-%m-%d %H:%M:%S%.9f %z UTC");
        let head = format!("{time} {} {}", self.event_type, self.status);

        match self.event_type {
            EventType::Container | EventType::Pod => {
                let mut line = format!("{head} {id} (image={}, name={}", self.image, self.name);
                if !self.pod_id.is_empty() {
                    line.push_str(&format!(", pod_id={}", self.pod_id));
                }
                if !self.health_status.is_empty() {
                    line.push_str(&format!(", health_status={}", self.health_status));
                }
                for (key, value) in &self.attributes {
                    line.push_str(&format!(", {key}={value}"));
                }
                line.push(')');
                line
            }
            EventType::Network => {
                format!("{head} {id} (container={id}, name={})", self.network)
            }
            EventType::Image => format!("{head} {id} {}", self.name),
            EventType::System => {
                if self.status == Status::LogRotation {
                    format!("{head} {}", self.name)
                } else {
                    head
                }
            }
            EventType::Volume | EventType::Machine => format!("{head} {}", self.name),
        }
    }
}

/// Returns at most the first [`SHORT_ID_LEN`] characters of `id`.
#[must_use]
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => id.get(..end).unwrap_or(id),
        None => id,
    }
}
