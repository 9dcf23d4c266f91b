// Bracket domain model: songs, matches, voter tallies and round shape.

pub mod matches;
pub mod round;
pub mod song;
pub mod vote;

pub use matches::{match_id, Choice, Match};
pub use round::{matches_in_round, pair_winners, round_label, TournamentShape};
pub use song::Song;
pub use vote::{MatchTally, VoterSummary};

use thiserror::Error;

/// Errors raised when a bracket would be built from an impossible shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BracketError {
    #[error("a day needs a power-of-two number of entrants (at least 2), got {count}")]
    EntrantCount { count: usize },

    #[error("cannot pair an odd number of songs ({count})")]
    OddPairing { count: usize },

    #[error("round {round} is deeper than any bracket this system can hold")]
    RoundTooDeep { round: u32 },
}
