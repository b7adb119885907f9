//! Mood classification: the 1..5 emoji scale and its display assets.

use serde::{Deserialize, Serialize};

/// Asset shown for markers without a (known) mood.
pub const DEFAULT_MOOD_IMAGE: &str = "/emoji/default.png";

/// Colour used for tiles without a mood.
pub const NEUTRAL_COLOR: &str = "#9e9e9e";

struct MoodEntry {
    label: &'static str,
    image: &'static str,
    color: &'static str,
}

const MOODS: [MoodEntry; 5] = [
    MoodEntry { label: "awful", image: "/emoji/1.png", color: "#d32f2f" },
    MoodEntry { label: "bad", image: "/emoji/2.png", color: "#f57c00" },
    MoodEntry { label: "okay", image: "/emoji/3.png", color: "#fbc02d" },
    MoodEntry { label: "good", image: "/emoji/4.png", color: "#7cb342" },
    MoodEntry { label: "great", image: "/emoji/5.png", color: "#388e3c" },
];

/// A validated mood tag in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct MoodTag(u8);

impl MoodTag {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    /// Lenient conversion from a stored column; anything out of range is unclassified.
    pub fn from_stored(value: Option<i16>) -> Option<Self> {
        value.and_then(|v| Self::try_from(v).ok())
    }

    pub fn value(self) -> u8 {
        self.0
    }

    fn entry(self) -> &'static MoodEntry {
        &MOODS[usize::from(self.0 - 1)]
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    pub fn image(self) -> &'static str {
        self.entry().image
    }

    pub fn color(self) -> &'static str {
        self.entry().color
    }
}

impl TryFrom<i16> for MoodTag {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(MoodTag::new)
            .ok_or_else(|| format!("mood tag out of range: {}", value))
    }
}

impl From<MoodTag> for i16 {
    fn from(tag: MoodTag) -> Self {
        i16::from(tag.0)
    }
}

/// Image for an optional mood, falling back to the default asset.
pub fn image_for(mood: Option<MoodTag>) -> &'static str {
    mood.map(MoodTag::image).unwrap_or(DEFAULT_MOOD_IMAGE)
}

/// Colour for an optional mood, falling back to the neutral colour.
pub fn color_for(mood: Option<MoodTag>) -> &'static str {
    mood.map(MoodTag::color).unwrap_or(NEUTRAL_COLOR)
}
