//! Owned maps SDK session.
//!
//! One session per screen, passed by reference to whatever needs the map.
//! The SDK is loaded at most once; concurrent callers share the same load.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use shared::{Error, Result};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::ClientConfig;
use crate::event::{CalendarEvent, EventSource, Position};

pub const DEFAULT_ZOOM: u8 = 12;

/// A loaded map instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapHandle {
    pub api_key: String,
    pub map_id: String,
    pub center: Position,
    pub zoom: u8,
}

/// Loads the maps SDK and creates the map.
#[async_trait]
pub trait MapLoader: Send + Sync {
    async fn load(&self) -> Result<MapHandle>;
}

/// Loader driven by the client configuration.
pub struct ConfiguredMapLoader {
    api_key: Option<String>,
    map_id: String,
    center: Position,
}

impl ConfiguredMapLoader {
    pub fn new(config: &ClientConfig, center: Position) -> Self {
        Self {
            api_key: config.maps_api_key.clone(),
            map_id: config.map_id.clone(),
            center,
        }
    }
}

#[async_trait]
impl MapLoader for ConfiguredMapLoader {
    async fn load(&self) -> Result<MapHandle> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("WAYFEEL_MAPS_API_KEY not set".to_string()))?;

        Ok(MapHandle {
            api_key,
            map_id: self.map_id.clone(),
            center: self.center,
            zoom: DEFAULT_ZOOM,
        })
    }
}

/// Marker shown on the map for one internal event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub id: String,
    pub position: Position,
    pub image: String,
    pub title: String,
}

pub struct MapSession {
    loader: Arc<dyn MapLoader>,
    handle: OnceCell<MapHandle>,
}

impl MapSession {
    pub fn new(loader: Arc<dyn MapLoader>) -> Self {
        Self {
            loader,
            handle: OnceCell::new(),
        }
    }

    /// Load the map if needed. A failed load leaves the session unloaded so
    /// a later call retries.
    pub async fn ensure_loaded(&self) -> Result<&MapHandle> {
        self.handle
            .get_or_try_init(|| async {
                let handle = self.loader.load().await?;
                info!("Map {} loaded", handle.map_id);
                Ok(handle)
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }
}

/// Pins for internal events that carry a position.
pub fn map_pins(events: &[CalendarEvent]) -> Vec<MapPin> {
    events
        .iter()
        .filter(|event| event.source == EventSource::Internal)
        .filter_map(|event| {
            let position = event.position?;
            Some(MapPin {
                id: event.id.clone(),
                position,
                image: event
                    .image_ref
                    .clone()
                    .unwrap_or_else(|| shared::mood::DEFAULT_MOOD_IMAGE.to_string()),
                title: event.title.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl MapLoader for CountingLoader {
        async fn load(&self) -> Result<MapHandle> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_first && call == 0 {
                return Err(Error::Internal("script failed to load".to_string()));
            }
            Ok(MapHandle {
                api_key: "key".to_string(),
                map_id: "wayfeel-moods".to_string(),
                center: Position { latitude: 52.37, longitude: 4.89 },
                zoom: DEFAULT_ZOOM,
            })
        }
    }

    fn loader(fail_first: bool) -> Arc<CountingLoader> {
        Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            fail_first,
        })
    }

    #[tokio::test]
    async fn test_concurrent_loads_run_once() {
        let loader = loader(false);
        let session = MapSession::new(loader.clone());

        let (a, b) = tokio::join!(session.ensure_loaded(), session.ensure_loaded());
        assert_eq!(a.unwrap(), b.unwrap());
        session.ensure_loaded().await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(session.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loader = loader(true);
        let session = MapSession::new(loader.clone());

        assert!(session.ensure_loaded().await.is_err());
        assert!(!session.is_loaded());
        assert!(session.ensure_loaded().await.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_configured_loader_requires_key() {
        let config = ClientConfig::new("http://localhost");
        let center = Position { latitude: 0.0, longitude: 0.0 };
        let session = MapSession::new(Arc::new(ConfiguredMapLoader::new(&config, center)));
        assert!(matches!(session.ensure_loaded().await, Err(Error::Config(_))));

        let config = config.with_maps(Some("key".to_string()), "styled");
        let session = MapSession::new(Arc::new(ConfiguredMapLoader::new(&config, center)));
        let handle = session.ensure_loaded().await.unwrap();
        assert_eq!(handle.map_id, "styled");
        assert_eq!(handle.zoom, DEFAULT_ZOOM);
    }

    #[test]
    fn test_pins_only_for_positioned_internal_events() {
        let start = Local.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let base = CalendarEvent {
            id: "m-1".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            title: "walk".to_string(),
            source: EventSource::Internal,
            mood_tag: None,
            image_ref: Some("/emoji/3.png".to_string()),
            position: Some(Position { latitude: 1.0, longitude: 2.0 }),
        };
        let unplaced = CalendarEvent {
            id: "m-2".to_string(),
            position: None,
            ..base.clone()
        };
        let external = CalendarEvent {
            id: "gcal:abc".to_string(),
            source: EventSource::External,
            ..base.clone()
        };

        let pins = map_pins(&[base, unplaced, external]);
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].id, "m-1");
        assert_eq!(pins[0].image, "/emoji/3.png");
    }
}
