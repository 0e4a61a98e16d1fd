//! Persisted profile and event records.
//!
//! One JSON file per profile — human-readable, git-friendly. String enums
//! are stored as written and parsed case-insensitively when the runtime
//! event is constructed, so hand-edited files with odd casing still load.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{AlmanacError, Result};
use crate::rule::RecurrenceRule;

/// Timestamp format used for `target-time`, `last-fired` and
/// `last-modified`: local wall time with a `+02:00`-style offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Legacy split date format (`07/04/2025`).
pub const LEGACY_DATE_FORMAT: &str = "%m/%d/%Y";

/// Legacy split time format (`06:30`).
pub const LEGACY_TIME_FORMAT: &str = "%H:%M";

/// Format a local instant for persistence.
pub fn format_local(t: DateTime<Local>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp back into local time.
pub fn parse_local(s: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s.trim()))
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| AlmanacError::Config(format!("bad timestamp '{s}': {e}")))
}

/// Combine the legacy `date` + `time` field pair into a local instant.
pub fn combine_legacy(date: &str, time: &str) -> Result<DateTime<Local>> {
    let d = NaiveDate::parse_from_str(date.trim(), LEGACY_DATE_FORMAT)
        .map_err(|e| AlmanacError::Config(format!("bad date '{date}': {e}")))?;
    let t = NaiveTime::parse_from_str(time.trim(), LEGACY_TIME_FORMAT)
        .map_err(|e| AlmanacError::Config(format!("bad time '{time}': {e}")))?;
    Local
        .from_local_datetime(&d.and_time(t))
        .earliest()
        .ok_or_else(|| AlmanacError::Config(format!("'{date} {time}' is not a valid local time")))
}

/// A persisted event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct EventRecord {
    /// Display order; rewritten 1..N by target time on every save.
    pub id: u32,
    /// Unique within the owning profile.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Derived from the rule; overwritten on save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec_description: Option<String>,
    /// `"AbsoluteEvent"` or `"AstronomicalEvent"`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// `"Enabled"` or `"Disabled"`.
    pub state: String,
    /// One of the `Frequency` names, e.g. `"EveryNthWeek"`.
    pub frequency: String,
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Day-selection bitmask for weekly/monthly frequencies.
    pub add_rate: i32,
    /// `"<Kind>:<±minutes>"` solar anchor; meaningful for astronomical
    /// events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub astro_offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_time: Option<String>,
    /// Legacy `HH:mm`; combined with `date` when `target-time` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Legacy `MM/dd/yyyy`; combined with `time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fired: Option<String>,
    /// Reserved; preserved verbatim across load/save.
    pub acknowledge: bool,
    /// Ordered, duplicate-free action names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
}

fn default_rate() -> u32 {
    1
}

impl EventRecord {
    /// Record for an event firing at a fixed wall-clock time.
    pub fn absolute(name: &str, target: DateTime<Local>, rule: RecurrenceRule) -> Self {
        Self {
            name: name.to_string(),
            event_type: crate::rule::EventType::Absolute.as_str().to_string(),
            state: crate::rule::EventState::Enabled.as_str().to_string(),
            frequency: rule.frequency.as_str().to_string(),
            rate: rule.rate,
            add_rate: rule.add_rate,
            target_time: Some(format_local(target)),
            ..Self::default()
        }
    }

    /// Record for an event anchored to a solar phenomenon, e.g.
    /// `"Sunset:-10"`. `target` supplies the starting date (and the nominal
    /// time the recurrence arithmetic steps from).
    pub fn astronomical(
        name: &str,
        astro_offset: &str,
        target: DateTime<Local>,
        rule: RecurrenceRule,
    ) -> Self {
        Self {
            astro_offset: Some(astro_offset.to_string()),
            event_type: crate::rule::EventType::Astronomical.as_str().to_string(),
            ..Self::absolute(name, target, rule)
        }
    }
}

/// A persisted profile: a named set of events in one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProfileRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stamped on every save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub events: Vec<EventRecord>,
}
