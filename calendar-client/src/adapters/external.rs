use std::sync::Arc;

use async_trait::async_trait;
use shared::{Error, ExternalEvent, Result};
use tracing::{info, warn};

use crate::event::CalendarEvent;
use crate::range::TimeRange;

/// Backend projecting a third-party calendar into busy blocks.
#[async_trait]
pub trait ExternalCalendarSource: Send + Sync {
    /// Raw busy blocks in `range`. `Error::NotConnected` when the user has no
    /// linked calendar.
    async fn fetch_busy_blocks(&self, range: &TimeRange) -> Result<Vec<serde_json::Value>>;
}

/// Result of one external fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFetch {
    pub connected: bool,
    pub events: Vec<CalendarEvent>,
}

impl ExternalFetch {
    pub fn not_connected() -> Self {
        Self {
            connected: false,
            events: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ExternalCalendarAdapter {
    source: Arc<dyn ExternalCalendarSource>,
}

impl ExternalCalendarAdapter {
    pub fn new(source: Arc<dyn ExternalCalendarSource>) -> Self {
        Self { source }
    }

    /// A missing link is a normal state, not an error. Anything else is a
    /// transient failure the caller should log and ride out.
    pub async fn fetch_range(&self, range: &TimeRange) -> Result<ExternalFetch> {
        match self.source.fetch_busy_blocks(range).await {
            Ok(raw) => Ok(ExternalFetch {
                connected: true,
                events: normalize_blocks(raw),
            }),
            Err(Error::NotConnected) => {
                info!("External calendar not connected");
                Ok(ExternalFetch::not_connected())
            }
            Err(e) => Err(e),
        }
    }
}

/// Parse raw blocks, skipping malformed ones.
pub fn normalize_blocks(raw: Vec<serde_json::Value>) -> Vec<CalendarEvent> {
    raw.into_iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<ExternalEvent>(value)
                .map_err(Error::from)
                .and_then(|block| CalendarEvent::from_external(&block));
            match parsed {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Skipping malformed external event: {}", e);
                    None
                }
            }
        })
        .collect()
}
