// Match state machine: Open -> Won, and the side effects of winning.

use tracing::{debug, info};

use crate::bracket::{round_label, Choice, Match, MatchTally};
use crate::error::{EngineError, PlaylistError};
use crate::ports::{MessageRef, PlaylistService};

use super::progression::{self, Progression};
use super::{Declaration, Engine};

/// Whether `choice` has enough voters to take the match.
pub fn crosses_threshold(tally: &MatchTally, choice: Choice, votes_to_win: usize) -> bool {
    tally.count(choice) >= votes_to_win
}

/// Declare `choice` the winner of `found`.
///
/// The store's check-and-set on the winner is the commit point: only the call
/// that sets it performs any visible side effect. Later steps are not retried
/// if they fail.
pub async fn declare(
    engine: &Engine,
    found: &Match,
    choice: Choice,
    message: &MessageRef,
) -> Result<Declaration, EngineError> {
    let winner = found.song(choice).clone();
    let loser = found.song(choice.other()).clone();
    let config = &engine.config;

    let committed = engine
        .store
        .set_match_winner(found.day, &found.id, &winner.id)
        .await
        .map_err(EngineError::Store)?;
    if !committed {
        info!(match_id = %found.id, "winner already declared, skipping");
        return Ok(Declaration::AlreadyDeclared);
    }
    info!(
        match_id = %found.id,
        day = found.day,
        round = found.round,
        winner = %winner.id,
        loser = %loser.id,
        "match won"
    );

    engine
        .venue
        .delete_message(message)
        .await
        .map_err(EngineError::Chat)?;

    remove_track(engine.playlists.as_ref(), &config.voting_playlist, &loser.id).await?;

    announce(
        engine,
        &format!(
            "{} beat out {} in the {}",
            winner.credit(),
            loser.credit(),
            round_label(found.round)
        ),
    )
    .await?;

    let progression = if found.round == 0 {
        announce(
            engine,
            &format!(
                "<@&{}> Day {} is over! {} was the Song of the Day!",
                config.mention_role,
                found.day,
                winner.credit()
            ),
        )
        .await?;
        remove_track(engine.playlists.as_ref(), &config.voting_playlist, &winner.id).await?;
        engine
            .playlists
            .add_track(&config.winners_playlist, &winner.id)
            .await?;
        info!(day = found.day, winner = %winner.id, "day over");
        Progression::DayOver
    } else {
        progression::advance_if_complete(engine, found.day, found.round).await?
    };

    Ok(Declaration::Declared {
        winner,
        loser,
        progression,
    })
}

pub(crate) async fn announce(engine: &Engine, content: &str) -> Result<(), EngineError> {
    engine
        .venue
        .send_message(&engine.config.announce_channel, content)
        .await
        .map(|_| ())
        .map_err(EngineError::Chat)
}

/// Remove a track, treating an already-absent track as done.
async fn remove_track(
    playlists: &dyn PlaylistService,
    playlist: &str,
    track_id: &str,
) -> Result<(), EngineError> {
    match playlists.remove_track(playlist, track_id).await {
        Ok(()) => Ok(()),
        Err(PlaylistError::TrackNotFound { .. }) => {
            debug!(playlist, track_id, "track already absent from playlist");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
