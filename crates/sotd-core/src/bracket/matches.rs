// Head-to-head matches and the two vote choices.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::song::Song;
use super::vote::MatchTally;

/// Reaction marker for a vote on song A.
pub const MARKER_A: &str = "\u{1F170}\u{FE0F}";
/// Reaction marker for a vote on song B.
pub const MARKER_B: &str = "\u{1F171}\u{FE0F}";

/// One of the two mutually exclusive sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
}

impl Choice {
    /// Parse a reaction emoji. Chat clients sometimes drop the variation
    /// selector, so the bare letter symbols are accepted too.
    pub fn from_marker(emoji: &str) -> Option<Self> {
        match emoji {
            MARKER_A | "\u{1F170}" => Some(Choice::A),
            MARKER_B | "\u{1F171}" => Some(Choice::B),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Choice::A => MARKER_A,
            Choice::B => MARKER_B,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Choice::A => Choice::B,
            Choice::B => Choice::A,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::A => write!(f, "A"),
            Choice::B => write!(f, "B"),
        }
    }
}

/// Deterministic match id for an ordered pair of song ids.
pub fn match_id(song_a_id: &str, song_b_id: &str) -> String {
    format!("{song_a_id}-{song_b_id}")
}

/// A stored match between two songs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub day: u32,
    /// Bracket depth: 0 is the final, larger values are earlier rounds.
    pub round: u32,
    pub song_a: Song,
    pub song_b: Song,
    pub tally: MatchTally,
    /// Set exactly once; a match with a winner is terminal.
    pub winner: Option<Song>,
    /// Chat message carrying the match, once it has been posted.
    pub message_id: Option<String>,
}

impl Match {
    pub fn new(day: u32, round: u32, song_a: Song, song_b: Song) -> Self {
        Match {
            id: match_id(&song_a.id, &song_b.id),
            day,
            round,
            song_a,
            song_b,
            tally: MatchTally::default(),
            winner: None,
            message_id: None,
        }
    }

    pub fn song(&self, choice: Choice) -> &Song {
        match choice {
            Choice::A => &self.song_a,
            Choice::B => &self.song_b,
        }
    }

    pub fn is_won(&self) -> bool {
        self.winner.is_some()
    }
}
