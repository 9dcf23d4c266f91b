// Error types for the vote engine and its collaborators.

use thiserror::Error;

use crate::bracket::BracketError;

/// Failure while processing one vote event. Any of these aborts the rest of
/// that event's chain; nothing already committed is rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("match store failed: {0:#}")]
    Store(anyhow::Error),

    #[error("chat venue call failed: {0:#}")]
    Chat(anyhow::Error),

    #[error(transparent)]
    Playlist(#[from] PlaylistError),

    #[error("round seeding failed: {0:#}")]
    Seeder(anyhow::Error),

    #[error("match {id} is no longer in the store")]
    MissingMatch { id: String },

    #[error("round {round} of day {day} has {found} winners, expected {expected}")]
    MalformedRound {
        day: u32,
        round: u32,
        found: usize,
        expected: usize,
    },

    #[error(transparent)]
    Bracket(#[from] BracketError),
}

/// Failure reported by a playlist service.
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The track is already absent. Removals treat this as success.
    #[error("track {track_id} is not in playlist {playlist}")]
    TrackNotFound { playlist: String, track_id: String },

    #[error("playlist request failed: {0:#}")]
    Failed(anyhow::Error),
}
