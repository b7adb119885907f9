use std::sync::Arc;

use async_trait::async_trait;
use shared::{MarkerRecord, NewMarker, Result};
use tracing::{info, warn};

use crate::event::CalendarEvent;

/// Backend holding a user's markers.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Raw marker records; validated by the adapter, not the store.
    async fn fetch_markers(&self, user_id: &str) -> Result<Vec<serde_json::Value>>;

    async fn create_marker(&self, marker: &NewMarker) -> Result<MarkerRecord>;
}

/// Loads markers as internal calendar events. Never fails: errors are logged
/// and reported as "no data this cycle".
#[derive(Clone)]
pub struct MarkerStoreAdapter {
    store: Arc<dyn MarkerStore>,
}

impl MarkerStoreAdapter {
    pub fn new(store: Arc<dyn MarkerStore>) -> Self {
        Self { store }
    }

    /// `None` when the store could not be reached; callers keep what they had.
    pub async fn load(&self, user_id: &str) -> Option<Vec<CalendarEvent>> {
        match self.store.fetch_markers(user_id).await {
            Ok(raw) => Some(normalize_markers(raw)),
            Err(e) => {
                warn!("Failed to load markers for {}: {}", user_id, e);
                None
            }
        }
    }

    /// Create a marker; `None` when the store rejected or failed the write.
    pub async fn create(&self, marker: &NewMarker) -> Option<CalendarEvent> {
        match self.store.create_marker(marker).await {
            Ok(record) => {
                info!("Created marker {}", record.id);
                Some(CalendarEvent::from_marker(&record))
            }
            Err(e) => {
                warn!("Failed to create marker: {}", e);
                None
            }
        }
    }
}

/// Parse raw records, skipping malformed ones.
pub fn normalize_markers(raw: Vec<serde_json::Value>) -> Vec<CalendarEvent> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<MarkerRecord>(value) {
            Ok(record) => Some(CalendarEvent::from_marker(&record)),
            Err(e) => {
                warn!("Skipping malformed marker record: {}", e);
                None
            }
        })
        .collect()
}
