// Round shape: how many matches a round holds, what it is called, and how
// winners are paired into the next round.

use super::song::Song;
use super::BracketError;

/// Number of matches in `round` (`2^round`).
pub fn matches_in_round(round: u32) -> Result<usize, BracketError> {
    // The next round up must still be countable.
    if round >= usize::BITS - 1 {
        return Err(BracketError::RoundTooDeep { round });
    }
    Ok(1 << round)
}

/// Human-readable name of a round, as used in announcements.
pub fn round_label(round: u32) -> String {
    match round {
        0 => "final round".to_string(),
        1 => "semifinal round".to_string(),
        2 => "quarterfinal round".to_string(),
        r => match matches_in_round(r) {
            Ok(matches) => format!("round of {}", matches * 2),
            Err(_) => format!("round {r}"),
        },
    }
}

/// Pair consecutive songs: `[0] vs [1]`, `[2] vs [3]`, and so on. The order of
/// the input decides the pairing, so the result is reproducible.
pub fn pair_winners(winners: &[Song]) -> Result<Vec<(Song, Song)>, BracketError> {
    if winners.len() % 2 != 0 {
        return Err(BracketError::OddPairing {
            count: winners.len(),
        });
    }
    Ok(winners
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Shape of one day's tournament, fixed when the day starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TournamentShape {
    entrants: usize,
    opening_round: u32,
}

impl TournamentShape {
    /// Derive the shape from the number of entrants, which must be a power of
    /// two and at least 2.
    pub fn for_entrants(entrants: usize) -> Result<Self, BracketError> {
        if entrants < 2 || !entrants.is_power_of_two() {
            return Err(BracketError::EntrantCount { count: entrants });
        }
        Ok(TournamentShape {
            entrants,
            opening_round: entrants.trailing_zeros() - 1,
        })
    }

    pub fn entrants(&self) -> usize {
        self.entrants
    }

    /// Round number the day starts at.
    pub fn opening_round(&self) -> u32 {
        self.opening_round
    }

    /// Every round of the day, earliest first, ending with the final.
    pub fn rounds(&self) -> impl Iterator<Item = u32> {
        (0..=self.opening_round).rev()
    }

    /// Total matches played over the whole day.
    pub fn total_matches(&self) -> usize {
        self.entrants - 1
    }
}
