//! Calendar screen controller: owns the view state, both adapters and the
//! reconciler for one user.
//!
//! Network work runs on spawned tasks so the screen stays interactive. Each
//! task reports back over a channel; results are applied on the next
//! [`CalendarController::sync`], where fetch tickets drop stale responses.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use shared::mood::{image_for, MoodTag};
use shared::{NewMarker, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{
    EventPersistence, ExternalCalendarAdapter, ExternalCalendarSource, ExternalFetch, MarkerStore,
    MarkerStoreAdapter,
};
use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::event::{CalendarEvent, EventSource, Position};
use crate::fetch::FetchTicket;
use crate::map_session::{map_pins, MapPin};
use crate::reconciler::{EditRejected, Reconciler, Selection};
use crate::view::{interpret_gesture, render_tiles, EventTile, Gesture, Navigation, ViewIntent, ViewState};

/// Prefix of ids given to events created locally and not yet stored.
const LOCAL_ID_PREFIX: &str = "local:";

/// Result of a gesture on the calendar.
#[derive(Debug)]
pub enum GestureOutcome {
    Selected(Selection),
    /// The edit is applied locally; the handle resolves once the write settles.
    EditIssued(JoinHandle<()>),
    Rejected(EditRejected),
    Ignored,
}

/// Work finished by a background task, waiting to be applied.
enum Settled {
    /// `None` when the store was unreachable
    Markers {
        ticket: FetchTicket,
        events: Option<Vec<CalendarEvent>>,
    },
    External {
        ticket: FetchTicket,
        result: Result<ExternalFetch>,
    },
    Created {
        temp_id: String,
        claimed_id: String,
        event: Option<CalendarEvent>,
    },
}

pub struct CalendarController {
    user_id: String,
    markers: MarkerStoreAdapter,
    external: ExternalCalendarAdapter,
    reconciler: Reconciler,
    state: ViewState,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
}

impl CalendarController {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn MarkerStore>,
        source: Arc<dyn ExternalCalendarSource>,
        persistence: Arc<dyn EventPersistence>,
        state: ViewState,
    ) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        Self {
            user_id: user_id.into(),
            markers: MarkerStoreAdapter::new(store),
            external: ExternalCalendarAdapter::new(source),
            reconciler: Reconciler::new(persistence),
            state,
            settled_tx,
            settled_rx,
        }
    }

    /// Controller backed by the Wayfeel API for every seam.
    pub fn from_api(config: &ClientConfig, user_id: impl Into<String>, state: ViewState) -> Result<Self> {
        let api = Arc::new(ApiClient::new(config)?);
        Ok(Self::new(user_id, api.clone(), api.clone(), api, state))
    }

    pub fn view_state(&self) -> ViewState {
        self.state
    }

    /// External connection state as of the last [`sync`](Self::sync).
    pub fn connected(&self) -> bool {
        self.reconciler.connected()
    }

    /// Reload markers and external events for the current view.
    ///
    /// Returns once the fetches are issued; the handle resolves when both
    /// results are queued for the next sync.
    pub fn refresh(&mut self) -> JoinHandle<()> {
        let marker_ticket = self.reconciler.begin_marker_fetch();
        let external_ticket = self.reconciler.begin_external_fetch();
        let range = self.state.range();
        let user_id = self.user_id.clone();
        let markers = self.markers.clone();
        let external = self.external.clone();
        let settled = self.settled_tx.clone();

        tokio::spawn(async move {
            let (events, result) = tokio::join!(markers.load(&user_id), external.fetch_range(&range));
            let _ = settled.send(Settled::Markers {
                ticket: marker_ticket,
                events,
            });
            let _ = settled.send(Settled::External {
                ticket: external_ticket,
                result,
            });
        })
    }

    /// Move the view and refetch the external range. Markers are not range
    /// bound and stay as loaded.
    pub fn navigate(&mut self, nav: Navigation, today: NaiveDate) -> JoinHandle<()> {
        self.state = self.state.navigate(nav, today);
        let ticket = self.reconciler.begin_external_fetch();
        let range = self.state.range();
        let external = self.external.clone();
        let settled = self.settled_tx.clone();

        tokio::spawn(async move {
            let result = external.fetch_range(&range).await;
            let _ = settled.send(Settled::External { ticket, result });
        })
    }

    /// Apply finished background work, then settled writes. Call before
    /// rendering.
    pub fn sync(&mut self) {
        while let Ok(settled) = self.settled_rx.try_recv() {
            match settled {
                Settled::Markers { ticket, events } => match events {
                    Some(events) => {
                        self.reconciler.replace_markers(ticket, events);
                    }
                    None => warn!("Marker fetch failed, keeping last known markers"),
                },
                Settled::External { ticket, result } => match result {
                    Ok(fetch) => {
                        self.reconciler.replace_external(ticket, fetch);
                    }
                    Err(e) => warn!("External calendar fetch failed, keeping last known events: {}", e),
                },
                Settled::Created {
                    temp_id,
                    claimed_id,
                    event,
                } => match event {
                    Some(event) => {
                        info!("Classified {} as marker {}", claimed_id, event.id);
                        self.reconciler.confirm_created(&temp_id, event);
                    }
                    None => {
                        self.reconciler.discard_unsaved(&temp_id);
                        self.reconciler.unsuppress(&claimed_id);
                    }
                },
            }
        }

        self.reconciler.sync_outcomes();
    }

    pub fn tiles(&mut self) -> Vec<EventTile> {
        self.sync();
        render_tiles(&self.reconciler.merged())
    }

    /// Pins for the map view of the merged events.
    pub fn map_pins(&mut self) -> Vec<MapPin> {
        self.sync();
        map_pins(&self.reconciler.merged())
    }

    pub fn select(&self, id: &str) -> Selection {
        self.reconciler.select_event(id)
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) -> GestureOutcome {
        let tiles = self.tiles();

        match interpret_gesture(&tiles, gesture) {
            None => GestureOutcome::Ignored,
            Some(ViewIntent::Select(id)) => GestureOutcome::Selected(self.select(&id)),
            Some(ViewIntent::Edit { id, start, end }) => match self.reconciler.apply_edit(&id, start, end) {
                Ok(handle) => GestureOutcome::EditIssued(handle),
                Err(rejected) => GestureOutcome::Rejected(rejected),
            },
        }
    }

    /// Claim an external event as a mood entry.
    ///
    /// The local copy shows immediately and the external block is hidden. The
    /// create runs in the background; if it fails both are undone on the next
    /// sync. `None` when `id` is not a visible external event.
    pub fn classify_external(&mut self, id: &str, mood: MoodTag, position: Position) -> Option<JoinHandle<()>> {
        let source_event = match self.reconciler.find(id) {
            Some(event) if event.source == EventSource::External => event.clone(),
            _ => {
                warn!("Cannot classify {}: not a visible external event", id);
                return None;
            }
        };

        let temp_id = format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4());
        let local = CalendarEvent {
            id: temp_id.clone(),
            source: EventSource::Internal,
            mood_tag: Some(mood),
            image_ref: Some(image_for(Some(mood)).to_string()),
            position: Some(position),
            ..source_event.clone()
        };

        self.reconciler.insert_unsaved(local);
        self.reconciler.suppress(id);

        let marker = NewMarker {
            latitude: position.latitude,
            longitude: position.longitude,
            emoji_id: Some(i16::from(mood)),
            text: Some(source_event.title.clone()).filter(|t| !t.is_empty()),
            anon: false,
            created_at: Some(source_event.start.with_timezone(&Utc)),
            end_at: Some(source_event.end.with_timezone(&Utc)),
        };
        let markers = self.markers.clone();
        let settled = self.settled_tx.clone();
        let claimed_id = id.to_string();

        Some(tokio::spawn(async move {
            let event = markers.create(&marker).await;
            let _ = settled.send(Settled::Created {
                temp_id,
                claimed_id,
                event,
            });
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{view_range, TimeRange, ViewKind};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, TimeZone};
    use serde_json::json;
    use shared::{EditRequest, Error, MarkerRecord};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    enum Blocks {
        Events(Vec<serde_json::Value>),
        /// One block per range, named after the range's first day
        PerRange,
        NotConnected,
        Down,
    }

    struct FakeBackend {
        /// `None` while the store is down
        markers: Mutex<Option<Vec<serde_json::Value>>>,
        blocks: Mutex<Blocks>,
        /// External fetches for this range wait until notified
        gate: Mutex<Option<(TimeRange, Arc<Notify>)>>,
        ranges: Mutex<Vec<TimeRange>>,
        edits: Mutex<Vec<EditRequest>>,
        fail_create: bool,
    }

    impl FakeBackend {
        fn new(blocks: Blocks) -> Self {
            Self {
                markers: Mutex::new(Some(vec![json!({
                    "id": "7f1c4a52-3c55-4a8e-9a57-0d3c5f3f8a10",
                    "created_at": "2024-03-01T10:00:00Z",
                    "latitude": 52.37,
                    "longitude": 4.89,
                    "emoji_id": 4,
                    "created_by": "user_2abc",
                    "anon": false
                })])),
                blocks: Mutex::new(blocks),
                gate: Mutex::new(None),
                ranges: Mutex::new(Vec::new()),
                edits: Mutex::new(Vec::new()),
                fail_create: false,
            }
        }

        fn hold(&self, range: TimeRange) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some((range, gate.clone()));
            gate
        }
    }

    #[async_trait]
    impl MarkerStore for FakeBackend {
        async fn fetch_markers(&self, _user_id: &str) -> Result<Vec<serde_json::Value>> {
            match &*self.markers.lock().unwrap() {
                Some(markers) => Ok(markers.clone()),
                None => Err(Error::Upstream { status: 503, message: "unavailable".to_string() }),
            }
        }

        async fn create_marker(&self, marker: &NewMarker) -> Result<MarkerRecord> {
            if self.fail_create {
                return Err(Error::Upstream { status: 500, message: "insert failed".to_string() });
            }
            Ok(MarkerRecord {
                id: Uuid::new_v4(),
                created_at: marker.created_at.unwrap_or_else(Utc::now),
                end_at: marker.end_at,
                latitude: marker.latitude,
                longitude: marker.longitude,
                emoji_id: marker.emoji_id,
                text: marker.text.clone(),
                created_by: "user_2abc".to_string(),
                anon: marker.anon,
            })
        }
    }

    #[async_trait]
    impl ExternalCalendarSource for FakeBackend {
        async fn fetch_busy_blocks(&self, range: &TimeRange) -> Result<Vec<serde_json::Value>> {
            self.ranges.lock().unwrap().push(range.clone());

            let gate = self
                .gate
                .lock()
                .unwrap()
                .as_ref()
                .filter(|(held, _)| held == range)
                .map(|(_, gate)| gate.clone());
            if let Some(gate) = gate {
                gate.notified().await;
            }

            match &*self.blocks.lock().unwrap() {
                Blocks::Events(events) => Ok(events.clone()),
                Blocks::PerRange => Ok(vec![json!({
                    "id": format!("wk-{}", range.time_min.date_naive()),
                    "title": "Planning",
                    "start": range.time_min_iso()
                })]),
                Blocks::NotConnected => Err(Error::NotConnected),
                Blocks::Down => Err(Error::Upstream { status: 503, message: "unavailable".to_string() }),
            }
        }
    }

    #[async_trait]
    impl EventPersistence for FakeBackend {
        async fn persist_edit(&self, edit: &EditRequest) -> Result<()> {
            self.edits.lock().unwrap().push(edit.clone());
            Ok(())
        }
    }

    fn standup() -> Blocks {
        Blocks::Events(vec![
            json!({ "id": "abc", "title": "Standup", "start": "2024-02-27T09:00:00Z", "end": "2024-02-27T09:15:00Z" }),
        ])
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn friday() -> NaiveDate {
        date(2024, 3, 1)
    }

    fn controller(backend: Arc<FakeBackend>) -> CalendarController {
        CalendarController::new(
            "user_2abc",
            backend.clone(),
            backend.clone(),
            backend,
            ViewState::new(friday(), ViewKind::Week),
        )
    }

    async fn loaded(backend: Arc<FakeBackend>) -> CalendarController {
        let mut ctl = controller(backend);
        ctl.refresh().await.unwrap();
        ctl.sync();
        ctl
    }

    fn local(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn tile_ids(ctl: &mut CalendarController) -> Vec<String> {
        ctl.tiles().into_iter().map(|t| t.id).collect()
    }

    const MARKER_ID: &str = "7f1c4a52-3c55-4a8e-9a57-0d3c5f3f8a10";

    #[tokio::test]
    async fn test_refresh_merges_both_sources() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = loaded(backend.clone()).await;

        assert_eq!(tile_ids(&mut ctl), vec!["gcal:abc".to_string(), MARKER_ID.to_string()]);
        assert!(ctl.connected());
        assert_eq!(backend.ranges.lock().unwrap()[0], view_range(friday(), ViewKind::Week));
    }

    #[tokio::test]
    async fn test_nothing_applied_before_sync() {
        let mut ctl = controller(Arc::new(FakeBackend::new(standup())));
        ctl.refresh().await.unwrap();

        assert!(!ctl.connected());
        assert_eq!(ctl.tiles().len(), 2);
        assert!(ctl.connected());
    }

    #[tokio::test]
    async fn test_not_connected_still_shows_markers() {
        let mut ctl = loaded(Arc::new(FakeBackend::new(Blocks::NotConnected))).await;

        assert!(!ctl.connected());
        assert_eq!(ctl.tiles().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_last_known_external() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = loaded(backend.clone()).await;

        *backend.blocks.lock().unwrap() = Blocks::Down;
        ctl.refresh().await.unwrap();

        assert!(tile_ids(&mut ctl).contains(&"gcal:abc".to_string()));
        assert!(ctl.connected());
    }

    #[tokio::test]
    async fn test_transient_marker_failure_keeps_last_known_markers() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = loaded(backend.clone()).await;
        assert!(tile_ids(&mut ctl).contains(&MARKER_ID.to_string()));

        *backend.markers.lock().unwrap() = None;
        ctl.refresh().await.unwrap();

        assert_eq!(tile_ids(&mut ctl), vec!["gcal:abc".to_string(), MARKER_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_navigate_refetches_new_range() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = controller(backend.clone());

        ctl.navigate(Navigation::Next, friday()).await.unwrap();
        assert_eq!(ctl.view_state().date, date(2024, 3, 8));

        ctl.navigate(Navigation::Switch(ViewKind::Day), friday()).await.unwrap();
        let ranges = backend.ranges.lock().unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], view_range(date(2024, 3, 8), ViewKind::Week));
        assert_eq!(ranges[1], view_range(date(2024, 3, 8), ViewKind::Day));
    }

    #[tokio::test]
    async fn test_older_navigation_resolving_last_is_discarded() {
        let backend = Arc::new(FakeBackend::new(Blocks::PerRange));
        let mut ctl = controller(backend.clone());
        let gate = backend.hold(view_range(date(2024, 3, 8), ViewKind::Week));

        let slow = ctl.navigate(Navigation::Next, friday());
        let fast = ctl.navigate(Navigation::Next, friday());
        fast.await.unwrap();
        gate.notify_one();
        slow.await.unwrap();

        assert_eq!(ctl.view_state().date, date(2024, 3, 15));
        let ids = tile_ids(&mut ctl);
        assert!(ids.contains(&"gcal:wk-2024-03-11".to_string()));
        assert!(!ids.contains(&"gcal:wk-2024-03-04".to_string()));
    }

    #[tokio::test]
    async fn test_gestures_work_while_refresh_in_flight() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = loaded(backend.clone()).await;
        let gate = backend.hold(view_range(friday(), ViewKind::Week));

        let pending = ctl.refresh();
        let outcome = ctl.handle_gesture(Gesture::Drop {
            id: MARKER_ID.to_string(),
            start: local(11),
            end: local(12),
        });
        let edit = match outcome {
            GestureOutcome::EditIssued(handle) => handle,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let tile = ctl.tiles().into_iter().find(|t| t.id == MARKER_ID).unwrap();
        assert_eq!((tile.start, tile.end), (local(11), local(12)));

        gate.notify_one();
        pending.await.unwrap();
        edit.await.unwrap();

        let tile = ctl.tiles().into_iter().find(|t| t.id == MARKER_ID).unwrap();
        assert_eq!((tile.start, tile.end), (local(11), local(12)));
        assert_eq!(backend.edits.lock().unwrap()[0].start, local(11).with_timezone(&Utc));
    }

    #[tokio::test]
    async fn test_drop_on_external_ignored() {
        let backend = Arc::new(FakeBackend::new(standup()));
        let mut ctl = loaded(backend.clone()).await;
        let before = ctl.tiles();

        let outcome = ctl.handle_gesture(Gesture::Drop {
            id: "gcal:abc".to_string(),
            start: local(11),
            end: local(12),
        });
        assert!(matches!(outcome, GestureOutcome::Ignored));
        assert_eq!(ctl.tiles(), before);
        assert!(backend.edits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_external_is_unclassified() {
        let mut ctl = loaded(Arc::new(FakeBackend::new(standup()))).await;

        let outcome = ctl.handle_gesture(Gesture::Select { id: "gcal:abc".to_string() });
        assert!(matches!(outcome, GestureOutcome::Selected(Selection::Unclassified(_))));
    }

    #[tokio::test]
    async fn test_classify_external_replaces_block() {
        let mut ctl = loaded(Arc::new(FakeBackend::new(standup()))).await;

        let position = Position { latitude: 52.0, longitude: 4.0 };
        let handle = ctl
            .classify_external("gcal:abc", MoodTag::new(2).unwrap(), position)
            .unwrap();

        // Shown optimistically before the create settles
        let ids = tile_ids(&mut ctl);
        assert!(!ids.contains(&"gcal:abc".to_string()));
        assert!(ids.iter().any(|id| id.starts_with(LOCAL_ID_PREFIX)));

        handle.await.unwrap();
        let tiles = ctl.tiles();
        let created = tiles.iter().find(|t| t.title == "Standup").unwrap();
        assert!(!created.id.starts_with(LOCAL_ID_PREFIX));
        assert!(!created.id.starts_with("gcal:"));
        assert!(created.draggable);
        assert_eq!(created.end - created.start, chrono::Duration::minutes(15));
        assert!(matches!(ctl.select(&created.id), Selection::Detail(_)));

        let pins = ctl.map_pins();
        assert!(pins.iter().any(|pin| pin.title == "Standup" && pin.position == position));
    }

    #[tokio::test]
    async fn test_classify_failure_restores_block() {
        let mut backend = FakeBackend::new(standup());
        backend.fail_create = true;
        let mut ctl = loaded(Arc::new(backend)).await;

        let position = Position { latitude: 52.0, longitude: 4.0 };
        let handle = ctl
            .classify_external("gcal:abc", MoodTag::new(2).unwrap(), position)
            .unwrap();
        handle.await.unwrap();

        assert_eq!(tile_ids(&mut ctl), vec!["gcal:abc".to_string(), MARKER_ID.to_string()]);
    }

    #[tokio::test]
    async fn test_classify_rejects_internal_event() {
        let mut ctl = loaded(Arc::new(FakeBackend::new(standup()))).await;

        let position = Position { latitude: 52.0, longitude: 4.0 };
        assert!(ctl.classify_external(MARKER_ID, MoodTag::new(2).unwrap(), position).is_none());
    }
}
