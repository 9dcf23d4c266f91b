// Vote normalization: turn a raw reaction change into a single-choice vote.

use tracing::debug;

use crate::bracket::Choice;
use crate::error::EngineError;
use crate::ports::{ChatUser, ChatVenue, MarkerAction, MessageRef, VoteEvent};

use super::tally::MarkerSnapshot;
use super::IgnoreReason;

/// A reaction change that should be counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub user: ChatUser,
    pub choice: Choice,
    pub action: MarkerAction,
}

/// What to do with a raw event before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Ignore(IgnoreReason),
    /// Unrecognized marker added; take it back off the message.
    Withdraw,
    Vote(Vote),
}

/// Classify a raw event. Bots and foreign channels are dropped before the
/// marker is even looked at.
pub fn classify(event: &VoteEvent, vote_channel: &str) -> Normalized {
    if event.user.bot {
        return Normalized::Ignore(IgnoreReason::NonHuman);
    }
    if event.message.channel_id != vote_channel {
        return Normalized::Ignore(IgnoreReason::WrongVenue);
    }
    match Choice::from_marker(&event.emoji) {
        Some(choice) => Normalized::Vote(Vote {
            user: event.user.clone(),
            choice,
            action: event.action,
        }),
        None => match event.action {
            MarkerAction::Added => Normalized::Withdraw,
            MarkerAction::Removed => Normalized::Ignore(IgnoreReason::UnrecognizedRemoval),
        },
    }
}

/// Remove the voter's opposite marker, if they hold one. Completes before the
/// caller takes its snapshot so a switch is never observed as a double vote.
pub async fn enforce_single_choice(
    venue: &dyn ChatVenue,
    message: &MessageRef,
    vote: &Vote,
) -> Result<(), EngineError> {
    let opposite = vote.choice.other();
    let holders = venue
        .marker_holders(message, opposite)
        .await
        .map_err(EngineError::Chat)?;
    if holders.iter().any(|u| u.id == vote.user.id) {
        debug!(user = %vote.user.id, from = %opposite, to = %vote.choice, "switching vote");
        venue
            .remove_marker(message, opposite, &vote.user.id)
            .await
            .map_err(EngineError::Chat)?;
    }
    Ok(())
}

/// Fetch the authoritative marker holders for both sides.
pub async fn snapshot(venue: &dyn ChatVenue, message: &MessageRef) -> Result<MarkerSnapshot, EngineError> {
    let a = venue
        .marker_holders(message, Choice::A)
        .await
        .map_err(EngineError::Chat)?;
    let b = venue
        .marker_holders(message, Choice::B)
        .await
        .map_err(EngineError::Chat)?;
    Ok(MarkerSnapshot { a, b })
}
