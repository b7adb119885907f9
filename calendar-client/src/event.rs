//! The normalized calendar event shared by both sources.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime};
use serde::Serialize;
use shared::mood::{image_for, MoodTag};
use shared::{Error, ExternalEvent, MarkerRecord, Result};
use tracing::warn;

use crate::range::at_local;

/// Prefix that keeps external ids disjoint from marker ids.
pub const EXTERNAL_ID_PREFIX: &str = "gcal:";

/// Length given to events whose source has no end.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

pub fn default_duration() -> Duration {
    Duration::minutes(DEFAULT_DURATION_MINUTES)
}

/// Where an event came from. Only internal events are editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub title: String,
    pub source: EventSource,
    pub mood_tag: Option<MoodTag>,
    pub image_ref: Option<String>,
    pub position: Option<Position>,
}

impl CalendarEvent {
    /// Normalize a stored marker.
    pub fn from_marker(record: &MarkerRecord) -> Self {
        let start = record.created_at.with_timezone(&Local);
        let end = record.end_at.map(|end| end.with_timezone(&Local));
        let mood_tag = MoodTag::from_stored(record.emoji_id);
        let id = record.id.to_string();

        Self {
            start,
            end: close_window(&id, start, end),
            id,
            title: record.text.clone().unwrap_or_default(),
            source: EventSource::Internal,
            mood_tag,
            image_ref: Some(image_for(mood_tag).to_string()),
            position: Some(Position {
                latitude: record.latitude,
                longitude: record.longitude,
            }),
        }
    }

    /// Normalize a busy block. Fails when the block carries no usable id or start.
    pub fn from_external(block: &ExternalEvent) -> Result<Self> {
        if block.id.trim().is_empty() {
            return Err(Error::Validation("external event without id".to_string()));
        }

        let id = external_id(&block.id);
        let start = parse_external_time(&block.start)
            .ok_or_else(|| Error::Validation(format!("external event {} has invalid start {}", id, block.start)))?;
        let end = match block.end.as_deref() {
            Some(raw) => {
                let parsed = parse_external_time(raw);
                if parsed.is_none() {
                    warn!("External event {} has invalid end {}; using default duration", id, raw);
                }
                parsed
            }
            None => None,
        };

        Ok(Self {
            start,
            end: close_window(&id, start, end),
            id,
            title: block.title.clone().unwrap_or_default(),
            source: EventSource::External,
            mood_tag: None,
            image_ref: None,
            position: None,
        })
    }

    pub fn is_editable(&self) -> bool {
        self.source == EventSource::Internal
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Copy with a new window.
    pub fn with_times(&self, start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self {
            start,
            end,
            ..self.clone()
        }
    }
}

/// Namespaced id of an external event.
pub fn external_id(raw: &str) -> String {
    format!("{}{}", EXTERNAL_ID_PREFIX, raw)
}

/// Missing or inverted ends become `start + 1h`.
fn close_window(id: &str, start: DateTime<Local>, end: Option<DateTime<Local>>) -> DateTime<Local> {
    match end {
        Some(end) if end >= start => end,
        Some(end) => {
            warn!("Event {} ends ({}) before it starts ({}); using default duration", id, end, start);
            start + default_duration()
        }
        None => start + default_duration(),
    }
}

/// RFC 3339 date-time, or `YYYY-MM-DD` for all-day blocks (local midnight).
fn parse_external_time(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| at_local(&Local, date.and_time(NaiveTime::MIN)))
}
