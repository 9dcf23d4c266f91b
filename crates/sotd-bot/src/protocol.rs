// Wire format of frames arriving from the chat relay.
//
// The relay holds the Discord gateway session and forwards the events the
// bot cares about as JSON text frames:
//
//   {"type":"REACTION_ADD","payload":{"channelId":..,"messageId":..,"emoji":..,"user":{..}}}
//   {"type":"REACTION_REMOVE","payload":{..same..}}
//   {"type":"START_DAY","payload":{"day":12,"songs":[{"id":..,"name":..,"artists":..}]}}
//   {"type":"HEARTBEAT"}

use serde::Deserialize;

use sotd_core::bracket::Song;
use sotd_core::ports::{ChatUser, MarkerAction, MessageRef, VoteEvent};

use crate::discord::avatar_url;

/// Messages sent from the relay to the bot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessage {
    ReactionAdd { payload: ReactionPayload },
    ReactionRemove { payload: ReactionPayload },
    /// Open a new day's bracket with the given entrants.
    StartDay { payload: StartDayPayload },
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    pub channel_id: String,
    pub message_id: String,
    pub emoji: String,
    pub user: RelayUser,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    /// Avatar hash; absent for users on a default avatar.
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartDayPayload {
    pub day: u32,
    pub songs: Vec<Song>,
}

impl ReactionPayload {
    pub fn into_vote_event(self, action: MarkerAction) -> VoteEvent {
        let avatar_url = avatar_url(&self.user.id, self.user.avatar.as_deref());
        VoteEvent {
            message: MessageRef::new(self.channel_id, self.message_id),
            user: ChatUser {
                name: self.user.global_name.unwrap_or(self.user.username),
                avatar_url,
                id: self.user.id,
                bot: self.user.bot,
            },
            emoji: self.emoji,
            action,
        }
    }
}

impl GatewayMessage {
    /// The vote event carried by a reaction frame, if any.
    pub fn into_vote_event(self) -> Option<VoteEvent> {
        match self {
            GatewayMessage::ReactionAdd { payload } => {
                Some(payload.into_vote_event(MarkerAction::Added))
            }
            GatewayMessage::ReactionRemove { payload } => {
                Some(payload.into_vote_event(MarkerAction::Removed))
            }
            GatewayMessage::StartDay { .. } | GatewayMessage::Heartbeat => None,
        }
    }
}
