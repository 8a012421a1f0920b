//! Now-playing metadata, parsed once at the fetch boundary.
//!
//! The upstream JSON is flat: current-track fields sit next to a numbered
//! history (`prev_artist_1`, `prev_title_1`, ... `prev_artist_5`). Everything
//! downstream works with [`NowPlaying`] and never looks keys up by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::track::TrackId;

/// Upper bound on history entries read from a payload.
pub const MAX_PREVIOUS_TRACKS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedTrack {
    pub artist: Option<String>,
    pub title: Option<String>,
}

impl PlayedTrack {
    /// "Artist – Title", or whichever half is known.
    pub fn display(&self) -> String {
        match (self.artist.as_deref(), self.title.as_deref()) {
            (Some(a), Some(t)) => format!("{} – {}", a, t),
            (Some(a), None) => a.to_string(),
            (None, Some(t)) => t.to_string(),
            (None, None) => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct NowPlaying {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub bit_depth: Option<String>,
    pub sample_rate: Option<String>,
    /// Most recent first, at most [`MAX_PREVIOUS_TRACKS`].
    pub previous: Vec<PlayedTrack>,
}

impl NowPlaying {
    pub fn track_id(&self) -> Option<TrackId> {
        TrackId::derive(self.artist.as_deref(), self.title.as_deref())
    }

    /// e.g. `24-bit / 48 kHz`. `None` unless both halves are present.
    pub fn quality_label(&self) -> Option<String> {
        let bits = self.bit_depth.as_deref()?;
        let rate = self.sample_rate.as_deref()?;
        let rate = match rate.parse::<f64>() {
            Ok(hz) if hz >= 1000.0 => {
                let khz = hz / 1000.0;
                if khz.fract() == 0.0 {
                    format!("{} kHz", khz as u64)
                } else {
                    format!("{:.1} kHz", khz)
                }
            }
            _ => rate.to_string(),
        };
        Some(format!("{}-bit / {}", bits, rate))
    }
}

impl From<Map<String, Value>> for NowPlaying {
    fn from(map: Map<String, Value>) -> Self {
        let field = |key: &str| map.get(key).and_then(text);

        let previous = (1..=MAX_PREVIOUS_TRACKS)
            .map(|i| PlayedTrack {
                artist: field(&format!("prev_artist_{}", i)),
                title: field(&format!("prev_title_{}", i)),
            })
            .filter(|t| t.artist.is_some() || t.title.is_some())
            .collect();

        Self {
            artist: field("artist"),
            title: field("title"),
            album: field("album"),
            date: field("date"),
            bit_depth: field("bit_depth"),
            sample_rate: field("sample_rate"),
            previous,
        }
    }
}

/// Strings are trimmed; numbers are rendered; anything else (or blank) is absent.
fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}
