//! Calendar screen core for Wayfeel.
//!
//! Merges a user's mood markers with busy blocks from their external
//! calendar, keeps optimistic drag/resize edits on top, and turns the merged
//! list into render tiles. Network access goes through the adapter traits so
//! the reconciliation logic stays testable without a server.

pub mod adapters;
pub mod api;
pub mod config;
pub mod controller;
pub mod event;
pub mod fetch;
pub mod map_session;
pub mod range;
pub mod reconciler;
pub mod view;

pub use adapters::{
    EventPersistence, ExternalCalendarAdapter, ExternalCalendarSource, ExternalFetch, MarkerStore, MarkerStoreAdapter,
};
pub use api::ApiClient;
pub use config::ClientConfig;
pub use controller::{CalendarController, GestureOutcome};
pub use event::{CalendarEvent, EventSource, Position, EXTERNAL_ID_PREFIX};
pub use fetch::{FetchSequencer, FetchTicket};
pub use map_session::{map_pins, ConfiguredMapLoader, MapHandle, MapLoader, MapPin, MapSession};
pub use range::{view_range, view_range_in, TimeRange, ViewKind};
pub use reconciler::{EditRejected, Reconciler, Selection};
pub use view::{interpret_gesture, render_tiles, EventTile, Gesture, Navigation, TileStyle, ViewIntent, ViewState};
