use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the normalised artist and title.
pub const TRACK_ID_SEPARATOR: char = '|';

/// Canonical key for a track: lowercased `artist|title`.
///
/// Two now-playing payloads that differ only in letter case map to the same
/// id. The like service keys both the per-listener like and the track count
/// on this string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Returns `None` when either field is missing or blank.
    pub fn derive(artist: Option<&str>, title: Option<&str>) -> Option<Self> {
        let artist = artist.map(str::trim).filter(|s| !s.is_empty())?;
        let title = title.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self(format!(
            "{}{}{}",
            artist.to_lowercase(),
            TRACK_ID_SEPARATOR,
            title.to_lowercase()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_differences_collapse() {
        let a = TrackId::derive(Some("Artist A"), Some("Title X")).unwrap();
        let b = TrackId::derive(Some("artist a"), Some("TITLE X")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "artist a|title x");
    }

    #[test]
    fn missing_field_yields_none() {
        assert_eq!(TrackId::derive(None, Some("Title")), None);
        assert_eq!(TrackId::derive(Some("Artist"), None), None);
        assert_eq!(TrackId::derive(Some("   "), Some("Title")), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let a = TrackId::derive(Some(" Sky "), Some("Blue\n")).unwrap();
        assert_eq!(a.to_string(), "sky|blue");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TrackId::derive(Some("Sky"), Some("Blue")).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sky|blue\"");
    }
}
