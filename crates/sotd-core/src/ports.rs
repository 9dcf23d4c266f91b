// Collaborator contracts consumed by the engine. Concrete implementations
// (SQLite, Discord, Spotify, the chat round seeder) live in the bot crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bracket::{Choice, Match, MatchTally, Song};
use crate::error::PlaylistError;

/// A message in a chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageRef {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        MessageRef {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// A chat account as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    /// Automated account; never counted as a voter.
    pub bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAction {
    Added,
    Removed,
}

/// Raw reaction-changed notification from the chat venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
    pub message: MessageRef,
    pub user: ChatUser,
    /// Emoji exactly as the venue reported it.
    pub emoji: String,
    pub action: MarkerAction,
}

/// The chat surface matches are voted on and announced in.
#[async_trait]
pub trait ChatVenue: Send + Sync {
    /// Everyone currently holding `choice`'s marker on `message`.
    async fn marker_holders(
        &self,
        message: &MessageRef,
        choice: Choice,
    ) -> anyhow::Result<Vec<ChatUser>>;

    /// Take one user's `choice` marker off `message`.
    async fn remove_marker(
        &self,
        message: &MessageRef,
        choice: Choice,
        user_id: &str,
    ) -> anyhow::Result<()>;

    /// Remove every holder of an arbitrary reaction emoji.
    async fn clear_reaction(&self, message: &MessageRef, emoji: &str) -> anyhow::Result<()>;

    /// Put the bot's own `choice` marker on `message`.
    async fn add_marker(&self, message: &MessageRef, choice: Choice) -> anyhow::Result<()>;

    async fn delete_message(&self, message: &MessageRef) -> anyhow::Result<()>;

    /// Post `content` to a channel and return the new message id.
    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<String>;
}

/// Persistent match and catalog state.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_song_by_id(&self, id: &str) -> anyhow::Result<Option<Song>>;

    /// The match `id` of `day`. Pairings recur across days, so the id alone
    /// does not name a row.
    async fn get_match_by_id(&self, day: u32, id: &str) -> anyhow::Result<Option<Match>>;

    async fn get_match_by_message(&self, message_id: &str) -> anyhow::Result<Option<Match>>;

    /// Overwrite the stored tally for a match.
    async fn set_match_voters(&self, day: u32, match_id: &str, tally: &MatchTally)
        -> anyhow::Result<()>;

    /// Record the winner only if none is set yet. Returns `true` when this call
    /// set it, `false` when the match already had a winner.
    async fn set_match_winner(&self, day: u32, match_id: &str, song_id: &str)
        -> anyhow::Result<bool>;

    async fn get_num_completed_matches(&self, day: u32, round: u32) -> anyhow::Result<usize>;

    /// Winners of every completed match in `(day, round)`, in match creation
    /// order.
    async fn get_previous_round_winners(&self, day: u32, round: u32) -> anyhow::Result<Vec<Song>>;

    /// Claim the right to advance `(day, round)`. Only the first call for a
    /// given round returns `true`.
    async fn claim_round_advance(&self, day: u32, round: u32) -> anyhow::Result<bool>;

    /// Create an open match. Creation order is preserved for winner lookups.
    async fn create_match(&self, day: u32, round: u32, song_a: &Song, song_b: &Song)
        -> anyhow::Result<Match>;

    /// Link a posted chat message to its match.
    async fn attach_message(&self, day: u32, match_id: &str, message_id: &str)
        -> anyhow::Result<()>;
}

/// External curated playlists mirroring the tournament.
#[async_trait]
pub trait PlaylistService: Send + Sync {
    async fn remove_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError>;

    async fn add_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError>;
}

/// Builds and posts the matches of a new round.
#[async_trait]
pub trait RoundSeeder: Send + Sync {
    /// Pair `winners` in order and open the matches of `round` for `day`.
    async fn seed_round(&self, winners: &[Song], day: u32, round: u32) -> anyhow::Result<()>;
}
