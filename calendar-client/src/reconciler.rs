//! Merges external busy blocks, stored markers and optimistic local edits.
//!
//! Precedence on id collision, lowest to highest: external events (minus
//! suppressed ids), marker-store events, the local overlay. The merged view
//! is rebuilt on every call to [`Reconciler::merged`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use shared::EditRequest;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::{EventPersistence, ExternalFetch};
use crate::event::{CalendarEvent, EventSource};
use crate::fetch::{FetchSequencer, FetchTicket};

/// Why an edit was not applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditRejected {
    #[error("event {0} is read-only")]
    ReadOnly(String),

    #[error("event {0} is not loaded")]
    Unknown(String),

    #[error("event {0} is still being created")]
    Unsaved(String),

    #[error("end is before start")]
    InvertedRange,
}

/// What the detail panel should show for a selected event.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Detail(CalendarEvent),
    /// External event without a mood; the caller may offer to classify it.
    Unclassified(CalendarEvent),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayState {
    /// Persistence request outstanding
    InFlight,
    /// Persistence failed; kept until the next fresh fetch
    Failed,
    /// Created locally, create request outstanding
    Unsaved,
}

#[derive(Debug, Clone)]
struct OverlayEntry {
    event: CalendarEvent,
    revision: u64,
    state: OverlayState,
}

#[derive(Debug)]
struct EditOutcome {
    id: String,
    revision: u64,
    succeeded: bool,
}

pub struct Reconciler {
    external: Vec<CalendarEvent>,
    markers: Vec<CalendarEvent>,
    overlay: HashMap<String, OverlayEntry>,
    suppressed: HashSet<String>,
    connected: bool,
    persistence: Arc<dyn EventPersistence>,
    outcomes_tx: mpsc::UnboundedSender<EditOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<EditOutcome>,
    next_revision: u64,
    external_fetches: FetchSequencer,
    marker_fetches: FetchSequencer,
}

impl Reconciler {
    pub fn new(persistence: Arc<dyn EventPersistence>) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        Self {
            external: Vec::new(),
            markers: Vec::new(),
            overlay: HashMap::new(),
            suppressed: HashSet::new(),
            connected: false,
            persistence,
            outcomes_tx,
            outcomes_rx,
            next_revision: 0,
            external_fetches: FetchSequencer::new(),
            marker_fetches: FetchSequencer::new(),
        }
    }

    /// Whether the last applied external fetch found a linked calendar.
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn begin_marker_fetch(&mut self) -> FetchTicket {
        self.marker_fetches.issue()
    }

    pub fn begin_external_fetch(&mut self) -> FetchTicket {
        self.external_fetches.issue()
    }

    /// Apply a marker fetch. Returns false when a newer fetch was issued since.
    ///
    /// Settled overlay entries are dropped; in-flight ones survive because the
    /// fetch may predate their write.
    pub fn replace_markers(&mut self, ticket: FetchTicket, events: Vec<CalendarEvent>) -> bool {
        if !self.marker_fetches.is_current(ticket) {
            debug!("Discarding stale marker fetch {:?}", ticket);
            return false;
        }

        self.markers = events;
        self.overlay.retain(|_, entry| entry.state != OverlayState::Failed);
        true
    }

    /// Apply an external fetch. Returns false when a newer fetch was issued since.
    pub fn replace_external(&mut self, ticket: FetchTicket, fetch: ExternalFetch) -> bool {
        if !self.external_fetches.is_current(ticket) {
            debug!("Discarding stale external fetch {:?}", ticket);
            return false;
        }

        self.connected = fetch.connected;
        self.external = fetch.events;
        true
    }

    /// Hide an external event, e.g. once the user claimed it as a mood entry.
    pub fn suppress(&mut self, id: impl Into<String>) {
        self.suppressed.insert(id.into());
    }

    pub fn unsuppress(&mut self, id: &str) -> bool {
        self.suppressed.remove(id)
    }

    /// Show a locally created event until its create request settles.
    pub fn insert_unsaved(&mut self, event: CalendarEvent) {
        let revision = self.bump_revision();
        self.overlay.insert(
            event.id.clone(),
            OverlayEntry {
                event,
                revision,
                state: OverlayState::Unsaved,
            },
        );
    }

    /// Replace a local placeholder with the stored event.
    pub fn confirm_created(&mut self, temp_id: &str, event: CalendarEvent) {
        self.overlay.remove(temp_id);
        self.upsert_marker(event);
    }

    pub fn discard_unsaved(&mut self, temp_id: &str) -> bool {
        match self.overlay.get(temp_id) {
            Some(entry) if entry.state == OverlayState::Unsaved => {
                self.overlay.remove(temp_id);
                true
            }
            _ => false,
        }
    }

    /// The merged event list, ordered by start then id.
    pub fn merged(&self) -> Vec<CalendarEvent> {
        let mut by_id: HashMap<&str, &CalendarEvent> = HashMap::new();

        for event in self.external.iter().filter(|e| !self.suppressed.contains(&e.id)) {
            by_id.insert(&event.id, event);
        }
        for event in &self.markers {
            by_id.insert(&event.id, event);
        }
        for entry in self.overlay.values() {
            by_id.insert(&entry.event.id, &entry.event);
        }

        let mut merged: Vec<CalendarEvent> = by_id.into_values().cloned().collect();
        merged.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        merged
    }

    /// Highest-precedence event for `id`.
    pub fn find(&self, id: &str) -> Option<&CalendarEvent> {
        self.overlay
            .get(id)
            .map(|entry| &entry.event)
            .or_else(|| self.markers.iter().find(|e| e.id == id))
            .or_else(|| {
                self.external
                    .iter()
                    .find(|e| e.id == id && !self.suppressed.contains(&e.id))
            })
    }

    pub fn select_event(&self, id: &str) -> Selection {
        match self.find(id) {
            None => Selection::Missing,
            Some(event) if event.source == EventSource::External && event.mood_tag.is_none() => {
                Selection::Unclassified(event.clone())
            }
            Some(event) => Selection::Detail(event.clone()),
        }
    }

    /// Move or resize an internal event.
    ///
    /// The overlay is updated before this returns; the write runs on a spawned
    /// task whose handle is returned. A failed write leaves the overlay in
    /// place and is only logged.
    pub fn apply_edit(
        &mut self,
        id: &str,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<JoinHandle<()>, EditRejected> {
        let current = match self.find(id) {
            Some(event) => event,
            None => {
                debug!("Ignoring edit of unknown event {}", id);
                return Err(EditRejected::Unknown(id.to_string()));
            }
        };

        if !current.is_editable() {
            debug!("Ignoring edit of read-only event {}", id);
            return Err(EditRejected::ReadOnly(id.to_string()));
        }
        if matches!(self.overlay.get(id), Some(entry) if entry.state == OverlayState::Unsaved) {
            debug!("Ignoring edit of unsaved event {}", id);
            return Err(EditRejected::Unsaved(id.to_string()));
        }
        if end < start {
            debug!("Ignoring inverted edit of {}", id);
            return Err(EditRejected::InvertedRange);
        }

        let edited = current.with_times(start, end);
        let revision = self.bump_revision();
        self.overlay.insert(
            id.to_string(),
            OverlayEntry {
                event: edited,
                revision,
                state: OverlayState::InFlight,
            },
        );

        let request = EditRequest {
            id: id.to_string(),
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        };
        let persistence = Arc::clone(&self.persistence);
        let outcomes = self.outcomes_tx.clone();

        Ok(tokio::spawn(async move {
            let succeeded = match persistence.persist_edit(&request).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to persist edit of {}: {}", request.id, e);
                    false
                }
            };
            // The reconciler may be gone by now; nothing left to update then.
            let _ = outcomes.send(EditOutcome {
                id: request.id,
                revision,
                succeeded,
            });
        }))
    }

    /// Fold settled writes into state. Call before rendering.
    ///
    /// Confirmed edits move into the marker base; failed ones stay in the
    /// overlay. Outcomes of edits superseded by a newer edit are ignored.
    pub fn sync_outcomes(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            let current = matches!(
                self.overlay.get(&outcome.id),
                Some(entry) if entry.revision == outcome.revision
            );
            if !current {
                continue;
            }

            if outcome.succeeded {
                if let Some(entry) = self.overlay.remove(&outcome.id) {
                    info!("Edit of {} confirmed", outcome.id);
                    self.upsert_marker(entry.event);
                }
            } else if let Some(entry) = self.overlay.get_mut(&outcome.id) {
                entry.state = OverlayState::Failed;
            }
            applied += 1;
        }

        applied
    }

    fn upsert_marker(&mut self, event: CalendarEvent) {
        match self.markers.iter_mut().find(|e| e.id == event.id) {
            Some(existing) => *existing = event,
            None => self.markers.push(event),
        }
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}
