//! View-layer model: navigation state, render tiles and gesture translation.
//!
//! Holds no event data of its own. Tiles are rebuilt from the reconciler's
//! merged list on every pass.

use chrono::{DateTime, Duration, Local, Months, NaiveDate};
use serde::Serialize;
use shared::mood::{color_for, image_for};
use tracing::debug;

use crate::event::{CalendarEvent, EventSource};
use crate::range::{view_range, TimeRange, ViewKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Prev,
    Next,
    Today,
    Switch(ViewKind),
}

/// Displayed date and granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub date: NaiveDate,
    pub view: ViewKind,
}

impl ViewState {
    pub fn new(date: NaiveDate, view: ViewKind) -> Self {
        Self { date, view }
    }

    /// Apply a navigation action. Month steps clamp to the last day of the
    /// target month.
    pub fn navigate(self, nav: Navigation, today: NaiveDate) -> Self {
        match nav {
            Navigation::Today => Self { date: today, ..self },
            Navigation::Switch(view) => Self { view, ..self },
            Navigation::Prev => Self {
                date: self.step(false),
                ..self
            },
            Navigation::Next => Self {
                date: self.step(true),
                ..self
            },
        }
    }

    /// Query range for the external calendar.
    pub fn range(&self) -> TimeRange {
        view_range(self.date, self.view)
    }

    fn step(&self, forward: bool) -> NaiveDate {
        let stepped = match (self.view, forward) {
            (ViewKind::Day, true) => self.date.checked_add_signed(Duration::days(1)),
            (ViewKind::Day, false) => self.date.checked_sub_signed(Duration::days(1)),
            (ViewKind::Week, true) => self.date.checked_add_signed(Duration::days(7)),
            (ViewKind::Week, false) => self.date.checked_sub_signed(Duration::days(7)),
            (ViewKind::Month, true) => self.date.checked_add_months(Months::new(1)),
            (ViewKind::Month, false) => self.date.checked_sub_months(Months::new(1)),
        };
        stepped.unwrap_or(self.date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileStyle {
    pub color: &'static str,
    pub image: Option<&'static str>,
    /// Neutral look for external events nobody classified
    pub placeholder: bool,
}

impl TileStyle {
    fn for_event(event: &CalendarEvent) -> Self {
        let placeholder = event.source == EventSource::External && event.mood_tag.is_none();

        Self {
            color: color_for(event.mood_tag),
            image: (!placeholder).then(|| image_for(event.mood_tag)),
            placeholder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTile {
    pub id: String,
    pub title: String,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub style: TileStyle,
    /// Drag and resize handles enabled
    pub draggable: bool,
}

pub fn render_tiles(events: &[CalendarEvent]) -> Vec<EventTile> {
    events
        .iter()
        .map(|event| EventTile {
            id: event.id.clone(),
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            style: TileStyle::for_event(event),
            draggable: event.is_editable(),
        })
        .collect()
}

/// Raw pointer gesture on a tile.
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Select {
        id: String,
    },
    Drop {
        id: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
    },
    Resize {
        id: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
    },
}

/// What the controller should do about a gesture.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewIntent {
    Select(String),
    Edit {
        id: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
    },
}

/// Drops and resizes on tiles that are missing or not draggable are ignored.
pub fn interpret_gesture(tiles: &[EventTile], gesture: Gesture) -> Option<ViewIntent> {
    match gesture {
        Gesture::Select { id } => Some(ViewIntent::Select(id)),
        Gesture::Drop { id, start, end } | Gesture::Resize { id, start, end } => {
            let draggable = tiles.iter().any(|tile| tile.id == id && tile.draggable);
            if !draggable {
                debug!("Ignoring gesture on non-draggable tile {}", id);
                return None;
            }
            Some(ViewIntent::Edit { id, start, end })
        }
    }
}
