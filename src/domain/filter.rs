//! Event filtering for reads and streams.
//!
//! Filters arrive as `key=value` strings. Values given under the same key
//! are alternatives (any may match); distinct keys must all match.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::event::{Event, EventType, Status};
use crate::error::EventsError;

/// A single parsed filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Container(String),
    Status(Status),
    Image(String),
    Label { key: String, value: Option<String> },
    Pod(String),
    Since(DateTime<Utc>),
    Until(DateTime<Utc>),
    Type(EventType),
    Volume(String),
    Network(String),
}

impl Predicate {
    fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Container(value) => {
                event.event_type == EventType::Container && name_or_id_matches(event, value)
            }
            Self::Pod(value) => {
                event.event_type == EventType::Pod && name_or_id_matches(event, value)
            }
            Self::Status(status) => event.status == *status,
            Self::Image(value) => {
                (event.event_type == EventType::Image && name_or_id_matches(event, value))
                    || event.image == *value
            }
            Self::Label { key, value } => match (event.attributes.get(key), value) {
                (Some(found), Some(wanted)) => found == wanted,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Self::Since(since) => event.time > *since,
            Self::Until(until) => event.time < *until,
            Self::Type(event_type) => event.event_type == *event_type,
            Self::Volume(value) => {
                event.event_type == EventType::Volume && event.name.starts_with(value.as_str())
            }
            Self::Network(value) => {
                event.event_type == EventType::Network
                    && (event.network == *value || event.id.starts_with(value.as_str()))
            }
        }
    }
}

/// Slots holding the explicit `since`/`until` read bounds. They are kept
/// apart from `since=`/`until=` filter strings so that both apply.
const SINCE_BOUND: &str = "since-bound";
const UNTIL_BOUND: &str = "until-bound";

fn name_or_id_matches(event: &Event, value: &str) -> bool {
    event.name == value || event.id.starts_with(value)
}

/// A compiled set of event filters.
///
/// An empty filter matches every event.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    predicates: BTreeMap<&'static str, Vec<Predicate>>,
}

impl EventFilter {
    /// Creates an empty filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `key=value` filter strings plus optional `since`/`until`
    /// bounds.
    ///
    /// The bounds are combined with any `since=`/`until=` filters: an
    /// event must satisfy both.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::InvalidFilter`] for malformed or unknown
    /// filters and [`EventsError::InvalidTimestamp`] for unparseable times.
    pub fn from_options(
        filters: &[String],
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<Self, EventsError> {
        let mut filter = Self::new();
        for raw in filters {
            filter.add(raw)?;
        }
        let now = Utc::now();
        if let Some(since) = since {
            filter.push(SINCE_BOUND, Predicate::Since(parse_input_time(since, now)?));
        }
        if let Some(until) = until {
            filter.push(UNTIL_BOUND, Predicate::Until(parse_input_time(until, now)?));
        }
        Ok(filter)
    }

    /// Adds one `key=value` filter string.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::InvalidFilter`] if the string has no `=`,
    /// names an unknown key, or carries an invalid status or type, and
    /// [`EventsError::InvalidTimestamp`] for bad `since`/`until` values.
    pub fn add(&mut self, raw: &str) -> Result<(), EventsError> {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(EventsError::InvalidFilter(format!(
                "{raw:?} is not of the form key=value"
            )));
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.to_string();

        let (slot, predicate) = match key.as_str() {
            "container" => ("container", Predicate::Container(value)),
            "event" | "status" => {
                let status = value.parse::<Status>().map_err(|_| {
                    EventsError::InvalidFilter(format!("{value:?} is not a valid event status"))
                })?;
                ("event", Predicate::Status(status))
            }
            "image" => ("image", Predicate::Image(value)),
            "label" => {
                let predicate = match value.split_once('=') {
                    Some((k, v)) => Predicate::Label {
                        key: k.to_string(),
                        value: Some(v.to_string()),
                    },
                    None => Predicate::Label { key: value, value: None },
                };
                ("label", predicate)
            }
            "pod" => ("pod", Predicate::Pod(value)),
            "since" => ("since", Predicate::Since(parse_input_time(&value, Utc::now())?)),
            "until" => ("until", Predicate::Until(parse_input_time(&value, Utc::now())?)),
            "type" => {
                let event_type = value.parse::<EventType>().map_err(|_| {
                    EventsError::InvalidFilter(format!("{value:?} is not a valid event type"))
                })?;
                ("type", Predicate::Type(event_type))
            }
            "volume" => ("volume", Predicate::Volume(value)),
            "network" => ("network", Predicate::Network(value)),
            _ => return Err(EventsError::InvalidFilter(format!("{key:?} is an invalid filter"))),
        };
        self.push(slot, predicate);
        Ok(())
    }

    fn push(&mut self, slot: &'static str, predicate: Predicate) {
        self.predicates.entry(slot).or_default().push(predicate);
    }

    /// Returns `true` if the event passes every filter key.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.predicates
            .values()
            .all(|alternatives| alternatives.iter().any(|p| p.matches(event)))
    }

    /// Returns the point after which no new event can match, if any.
    /// Streams stop once the clock passes it.
    ///
    /// Within a slot the latest `until` wins; across slots the earliest.
    #[must_use]
    pub fn until(&self) -> Option<DateTime<Utc>> {
        ["until", UNTIL_BOUND]
            .iter()
            .filter_map(|slot| {
                self.predicates
                    .get(slot)?
                    .iter()
                    .filter_map(|p| match p {
                        Predicate::Until(t) => Some(*t),
                        _ => None,
                    })
                    .max()
            })
            .min()
    }

    /// Returns the number of distinct filter keys.
    #[must_use]
    pub fn count(&self) -> usize {
        self.predicates.len()
    }

    /// Returns `true` if no filters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Parses a user-supplied point in time.
///
/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` (UTC), Unix
/// seconds with an optional fraction, or a relative duration such as
/// `10m` or `1h30m`, interpreted as `now` minus that duration.
///
/// # Errors
///
/// Returns [`EventsError::InvalidTimestamp`] if no format matches.
pub fn parse_input_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, EventsError> {
    let input = input.trim();
    let invalid = || EventsError::InvalidTimestamp(input.to_string());

    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&t));
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = d.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    if let Some(t) = parse_unix_seconds(input) {
        return Ok(t);
    }
    if let Some(d) = parse_duration(input) {
        return now.checked_sub_signed(d).ok_or_else(invalid);
    }
    Err(invalid())
}

fn parse_unix_seconds(input: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match input.split_once('.') {
        Some((s, f)) => (s, f),
        None => (input, ""),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) || frac.len() > 9 {
        return None;
    }
    let secs: i64 = secs.parse().ok()?;
    let nanos: u32 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

/// Parses a duration made of `<number><unit>` groups, where unit is one of
/// `ns`, `us`, `ms`, `s`, `m`, `h`.
fn parse_duration(input: &str) -> Option<chrono::Duration> {
    let mut total = chrono::Duration::zero();
    let mut rest = input;
    if rest.is_empty() {
        return None;
    }
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(digits);
        let number: i64 = number.parse().ok()?;
        let unit_len = tail.bytes().take_while(u8::is_ascii_alphabetic).count();
        let (unit, tail) = tail.split_at(unit_len);
        let part = match unit {
            "ns" => chrono::Duration::nanoseconds(number),
            "us" => chrono::Duration::microseconds(number),
            "ms" => chrono::Duration::milliseconds(number),
            "s" => chrono::Duration::try_seconds(number)?,
            "m" => chrono::Duration::try_minutes(number)?,
            "h" => chrono::Duration::try_hours(number)?,
            _ => return None,
        };
        total = total.checked_add(&part)?;
        rest = tail;
    }
    Some(total)
}
