//! Source adapters: each turns one backend into normalized calendar events.

mod external;
mod markers;

use async_trait::async_trait;
use shared::{EditRequest, Result};

pub use external::{normalize_blocks, ExternalCalendarAdapter, ExternalCalendarSource, ExternalFetch};
pub use markers::{normalize_markers, MarkerStore, MarkerStoreAdapter};

/// Writes a confirmed move/resize of an internal event.
#[async_trait]
pub trait EventPersistence: Send + Sync {
    async fn persist_edit(&self, edit: &EditRequest) -> Result<()>;
}
