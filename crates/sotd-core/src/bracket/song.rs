// Catalog songs as the bracket sees them.

use serde::{Deserialize, Serialize};

/// A song entered into the bracket. Owned by the external catalog; the engine
/// only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Song {
    /// Catalog track id (e.g. a Spotify track id).
    pub id: String,
    pub name: String,
    /// Display string of the performing artists, already joined.
    pub artists: String,
}

impl Song {
    pub fn new(id: impl Into<String>, name: impl Into<String>, artists: impl Into<String>) -> Self {
        Song {
            id: id.into(),
            name: name.into(),
            artists: artists.into(),
        }
    }

    /// "Name by Artists", the form used in every announcement.
    pub fn credit(&self) -> String {
        format!("{} by {}", self.name, self.artists)
    }
}
