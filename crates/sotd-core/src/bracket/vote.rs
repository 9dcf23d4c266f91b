// Voter rosters persisted for each match.

use serde::{Deserialize, Serialize};

use super::matches::Choice;

/// The public face of one voter, as stored alongside a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSummary {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub avatar: String,
}

/// Full per-choice voter rosters for a match. Always rebuilt from an
/// authoritative snapshot, never patched incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTally {
    pub song_a_votes: Vec<VoterSummary>,
    pub song_b_votes: Vec<VoterSummary>,
}

impl MatchTally {
    pub fn voters(&self, choice: Choice) -> &[VoterSummary] {
        match choice {
            Choice::A => &self.song_a_votes,
            Choice::B => &self.song_b_votes,
        }
    }

    pub fn count(&self, choice: Choice) -> usize {
        self.voters(choice).len()
    }

    /// Which side `user_id` is counted on, if any.
    pub fn side_of(&self, user_id: &str) -> Option<Choice> {
        if self.song_a_votes.iter().any(|v| v.id == user_id) {
            Some(Choice::A)
        } else if self.song_b_votes.iter().any(|v| v.id == user_id) {
            Some(Choice::B)
        } else {
            None
        }
    }
}
