// Round progression: advance the bracket once every match of a round is won.

use tracing::{debug, info, warn};

use crate::bracket::matches_in_round;
use crate::error::EngineError;

use super::winner::announce;
use super::Engine;

/// What happened to the round after one of its matches was won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progression {
    /// The final was won; the day is over.
    DayOver,
    /// Sibling matches are still open.
    Waiting { completed: usize, needed: usize },
    /// The next round was handed to the seeder.
    Advanced { next_round: u32, matches: usize },
    /// A concurrent event already advanced this round.
    AlreadyAdvanced,
}

/// Advance `(day, round)` if all `2^round` of its matches have winners.
/// Never called for the final.
pub async fn advance_if_complete(
    engine: &Engine,
    day: u32,
    round: u32,
) -> Result<Progression, EngineError> {
    let needed = matches_in_round(round)?;
    let completed = engine
        .store
        .get_num_completed_matches(day, round)
        .await
        .map_err(EngineError::Store)?;

    if completed != needed {
        if completed > needed {
            warn!(day, round, completed, needed, "round has more completed matches than it should");
        } else {
            debug!(day, round, completed, needed, "round still in progress");
        }
        return Ok(Progression::Waiting { completed, needed });
    }

    let claimed = engine
        .store
        .claim_round_advance(day, round)
        .await
        .map_err(EngineError::Store)?;
    if !claimed {
        info!(day, round, "round already advanced");
        return Ok(Progression::AlreadyAdvanced);
    }

    announce(
        engine,
        &format!("<@&{}> A new round is upon us!", engine.config.mention_role),
    )
    .await?;

    let winners = engine
        .store
        .get_previous_round_winners(day, round)
        .await
        .map_err(EngineError::Store)?;
    if winners.len() != needed {
        return Err(EngineError::MalformedRound {
            day,
            round,
            found: winners.len(),
            expected: needed,
        });
    }

    let next_round = round - 1;
    engine
        .seeder
        .seed_round(&winners, day, next_round)
        .await
        .map_err(EngineError::Seeder)?;

    let matches = needed / 2;
    info!(day, round = next_round, matches, "next round seeded");
    Ok(Progression::Advanced { next_round, matches })
}
