mod calendar;
mod catalog;
mod client;
mod countdown;
mod display;
mod relevance;
mod window;

pub use calendar::build_calendar_url;
pub use catalog::{status_label, SessionTab, TabCounts};
pub use client::{load_sessions_file, SessionClient};
pub use relevance::{evaluate, Evaluation, RelevanceState};

use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Duration used when a session does not carry one
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Lifecycle status reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Live,
    Ended,
    Cancelled,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

/// A scheduled live session of a course, as returned by the platform API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Intended start. `None` when missing or unparseable.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Length in minutes
    #[serde(
        rename = "duration",
        alias = "durationMinutes",
        default,
        deserialize_with = "lenient_minutes"
    )]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
}

impl Session {
    /// Duration in minutes, falling back to the default for absent or non-positive values
    pub fn effective_duration(&self) -> i64 {
        match self.duration_minutes {
            Some(minutes) if minutes > 0 => minutes,
            _ => DEFAULT_DURATION_MINUTES,
        }
    }

    /// Start and end of the session. `None` without a start, or when the duration
    /// pushes the end past the representable range.
    pub fn time_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.scheduled_time?;
        let length = TimeDelta::try_minutes(self.effective_duration())?;
        let end = start.checked_add_signed(length)?;
        Some((start, end))
    }
}

#[cfg(test)]
impl Session {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            scheduled_time: None,
            duration_minutes: None,
            description: None,
            status: SessionStatus::Scheduled,
            meeting_url: None,
            recording_url: None,
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(start);
        self
    }

    pub fn lasting(mut self, minutes: i64) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}

/// Accepts RFC 3339 strings, naive ISO datetimes (read as UTC) and epoch milliseconds.
/// Anything else decodes as `None` so the session drops out of every tier instead of
/// failing the whole list.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|m| m.round() as i64),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok().map(|m| m.round() as i64),
        _ => None,
    })
}

pub(crate) fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        }
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
