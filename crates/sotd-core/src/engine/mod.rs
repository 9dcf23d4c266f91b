// The bracket vote engine.
//
// Every reaction change runs the same chain, serialized per match:
// normalize the raw event, rebuild the tally from the live markers, declare a
// winner when the changed side reaches the threshold, and advance the round
// once all of its matches are decided.

pub mod locks;
pub mod normalize;
pub mod progression;
pub mod tally;
pub mod winner;

use std::sync::Arc;

use tracing::{debug, info};

use crate::bracket::{Choice, MatchTally, Song};
use crate::error::EngineError;
use crate::ports::{ChatVenue, MarkerAction, MatchStore, PlaylistService, RoundSeeder, VoteEvent};

use self::locks::MatchLocks;
use self::normalize::Normalized;
use self::progression::Progression;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings the engine needs from the bot configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Voters one side needs to win a match outright.
    pub votes_to_win: usize,
    /// Role mentioned in round and day announcements.
    pub mention_role: String,
    /// The only channel whose reactions count as votes.
    pub vote_channel: String,
    pub announce_channel: String,
    pub voting_playlist: String,
    pub winners_playlist: String,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an event had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Reacted by an automated account.
    NonHuman,
    /// Reaction outside the voting channel.
    WrongVenue,
    /// An unrecognized reaction went away; nothing to do.
    UnrecognizedRemoval,
    /// The message does not carry a match.
    UnknownMessage,
    /// The match already has a winner.
    MatchClosed,
}

/// Result of the winner-declaration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// Another event set the winner first; nothing was announced.
    AlreadyDeclared,
    Declared {
        winner: Song,
        loser: Song,
        progression: Progression,
    },
}

/// What one vote event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Ignored(IgnoreReason),
    /// An unrecognized marker was taken back off the message.
    Withdrawn { emoji: String },
    /// The tally was recomputed and stored; no winner yet.
    Counted { match_id: String, tally: MatchTally },
    /// The tally crossed the threshold.
    Decided {
        match_id: String,
        tally: MatchTally,
        declaration: Declaration,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Shared handle to the engine; clone it into each event task.
#[derive(Clone)]
pub struct Engine {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) store: Arc<dyn MatchStore>,
    pub(crate) venue: Arc<dyn ChatVenue>,
    pub(crate) playlists: Arc<dyn PlaylistService>,
    pub(crate) seeder: Arc<dyn RoundSeeder>,
    locks: Arc<MatchLocks>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn MatchStore>,
        venue: Arc<dyn ChatVenue>,
        playlists: Arc<dyn PlaylistService>,
        seeder: Arc<dyn RoundSeeder>,
    ) -> Self {
        Engine {
            config: Arc::new(config),
            store,
            venue,
            playlists,
            seeder,
            locks: Arc::new(MatchLocks::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of matches currently holding a serialization slot.
    pub fn open_lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Run the full chain for one reaction change.
    pub async fn handle_vote(&self, event: VoteEvent) -> Result<VoteOutcome, EngineError> {
        let vote = match normalize::classify(&event, &self.config.vote_channel) {
            Normalized::Ignore(reason) => {
                debug!(?reason, message = %event.message.message_id, "ignoring reaction");
                return Ok(VoteOutcome::Ignored(reason));
            }
            Normalized::Withdraw => {
                debug!(emoji = %event.emoji, message = %event.message.message_id, "withdrawing unrecognized marker");
                self.venue
                    .clear_reaction(&event.message, &event.emoji)
                    .await
                    .map_err(EngineError::Chat)?;
                return Ok(VoteOutcome::Withdrawn { emoji: event.emoji });
            }
            Normalized::Vote(vote) => vote,
        };

        let Some(found) = self
            .store
            .get_match_by_message(&event.message.message_id)
            .await
            .map_err(EngineError::Store)?
        else {
            debug!(message = %event.message.message_id, "reaction on a message without a match");
            return Ok(VoteOutcome::Ignored(IgnoreReason::UnknownMessage));
        };

        let _slot = self.locks.acquire(found.day, &found.id).await;

        // Re-read under the lock: an event queued ahead of this one may have
        // closed the match.
        let current = self
            .store
            .get_match_by_id(found.day, &found.id)
            .await
            .map_err(EngineError::Store)?
            .ok_or_else(|| EngineError::MissingMatch {
                id: found.id.clone(),
            })?;
        if current.is_won() {
            self.locks.release(current.day, &current.id);
            debug!(match_id = %current.id, "vote on a closed match");
            return Ok(VoteOutcome::Ignored(IgnoreReason::MatchClosed));
        }

        if vote.action == MarkerAction::Added {
            normalize::enforce_single_choice(self.venue.as_ref(), &event.message, &vote).await?;
        }

        let snapshot = normalize::snapshot(self.venue.as_ref(), &event.message).await?;
        let acting = (vote.action == MarkerAction::Added).then_some((vote.user.id.as_str(), vote.choice));
        let tally = tally::aggregate(&snapshot, acting);
        tally::record(self.store.as_ref(), current.day, &current.id, &tally).await?;
        debug!(
            match_id = %current.id,
            a = tally.count(Choice::A),
            b = tally.count(Choice::B),
            "tally recorded"
        );

        if vote.action == MarkerAction::Added
            && winner::crosses_threshold(&tally, vote.choice, self.config.votes_to_win)
        {
            info!(match_id = %current.id, choice = %vote.choice, "win threshold reached");
            let declaration = winner::declare(self, &current, vote.choice, &event.message).await?;
            self.locks.release(current.day, &current.id);
            return Ok(VoteOutcome::Decided {
                match_id: current.id,
                tally,
                declaration,
            });
        }

        Ok(VoteOutcome::Counted {
            match_id: current.id,
            tally,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
