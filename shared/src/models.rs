//! Wire records exchanged between the API routes and the calendar client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A persisted mood marker, as stored and as returned by `GET /markers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarkerRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub emoji_id: Option<i16>,
    #[serde(default)]
    pub text: Option<String>,
    pub created_by: String,
    #[serde(default)]
    pub anon: bool,
}

/// Create marker request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_marker_window"))]
pub struct NewMarker {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 1, max = 5))]
    pub emoji_id: Option<i16>,
    #[validate(length(max = 500))]
    pub text: Option<String>,
    #[serde(default)]
    pub anon: bool,
    /// Defaults to the time of insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

fn validate_marker_window(marker: &NewMarker) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (marker.created_at, marker.end_at) {
        if end < start {
            return Err(ValidationError::new("end_before_start"));
        }
    }
    Ok(())
}

/// Move/resize of an internal event, sent to `PATCH /calendar/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRequest {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Successful edit acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResponse {
    pub ok: bool,
}

/// Error payload returned by every route on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

/// A busy block from the user's external calendar.
///
/// `start`/`end` are RFC 3339 date-times, or `YYYY-MM-DD` for all-day blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

/// Response of `GET /calendar/google/events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalEventsResponse {
    pub events: Vec<ExternalEvent>,
}
