// Tally aggregation: rebuild a match's voter rosters from live marker state.

use crate::bracket::{Choice, MatchTally, VoterSummary};
use crate::error::EngineError;
use crate::ports::{ChatUser, MatchStore};

/// Everyone holding each marker at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSnapshot {
    pub a: Vec<ChatUser>,
    pub b: Vec<ChatUser>,
}

/// Build the tally for a snapshot.
///
/// Automated accounts are dropped. A user found under both markers is
/// mid-switch: the acting voter lands on the side they just chose, anyone else
/// is left out until their own event settles it. Duplicate holders collapse.
pub fn aggregate(snapshot: &MarkerSnapshot, acting: Option<(&str, Choice)>) -> MatchTally {
    let in_both = |user: &ChatUser| {
        snapshot.a.iter().any(|u| u.id == user.id) && snapshot.b.iter().any(|u| u.id == user.id)
    };

    let side = |holders: &[ChatUser], choice: Choice| -> Vec<VoterSummary> {
        let mut voters: Vec<VoterSummary> = Vec::with_capacity(holders.len());
        for user in holders.iter().filter(|u| !u.bot) {
            if in_both(user) {
                match acting {
                    Some((id, chosen)) if id == user.id && chosen == choice => {}
                    _ => continue,
                }
            }
            if voters.iter().any(|v| v.id == user.id) {
                continue;
            }
            voters.push(summarize(user));
        }
        voters
    };

    MatchTally {
        song_a_votes: side(&snapshot.a, Choice::A),
        song_b_votes: side(&snapshot.b, Choice::B),
    }
}

fn summarize(user: &ChatUser) -> VoterSummary {
    VoterSummary {
        id: user.id.clone(),
        display_name: user.name.clone(),
        avatar: user.avatar_url.clone(),
    }
}

/// Persist `tally` as the match's record, replacing whatever was there.
pub async fn record(
    store: &dyn MatchStore,
    day: u32,
    match_id: &str,
    tally: &MatchTally,
) -> Result<(), EngineError> {
    store
        .set_match_voters(day, match_id, tally)
        .await
        .map_err(EngineError::Store)
}
