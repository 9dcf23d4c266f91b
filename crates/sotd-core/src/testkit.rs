// In-memory collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;

use crate::bracket::{Choice, Match, MatchTally, Song};
use crate::engine::{Engine, EngineConfig, VoteOutcome};
use crate::error::{EngineError, PlaylistError};
use crate::ports::{
    ChatUser, ChatVenue, MarkerAction, MatchStore, MessageRef, PlaylistService, RoundSeeder,
    VoteEvent,
};

pub const VOTE_CHANNEL: &str = "vote-channel";
pub const ANNOUNCE_CHANNEL: &str = "announce-channel";
pub const VOTING_PLAYLIST: &str = "voting-playlist";
pub const WINNERS_PLAYLIST: &str = "winners-playlist";

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn song_for(id: &str) -> Song {
    Song::new(id, format!("Song {id}"), format!("Artist {id}"))
}

pub fn user(id: &str) -> ChatUser {
    ChatUser {
        id: id.to_string(),
        name: format!("name-{id}"),
        avatar_url: format!("https://cdn.example/{id}.png"),
        bot: false,
    }
}

pub fn bot_user() -> ChatUser {
    ChatUser {
        bot: true,
        ..user("sotd-bot")
    }
}

pub fn added(message: &MessageRef, who: &ChatUser, emoji: &str) -> VoteEvent {
    VoteEvent {
        message: message.clone(),
        user: who.clone(),
        emoji: emoji.to_string(),
        action: MarkerAction::Added,
    }
}

pub fn removed(message: &MessageRef, who: &ChatUser, emoji: &str) -> VoteEvent {
    VoteEvent {
        action: MarkerAction::Removed,
        ..added(message, who, emoji)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    songs: HashMap<String, Song>,
    matches: Vec<Match>,
    advanced: HashSet<(u32, u32)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert(&self, m: Match) {
        let mut state = self.state.lock().unwrap();
        state.songs.insert(m.song_a.id.clone(), m.song_a.clone());
        state.songs.insert(m.song_b.id.clone(), m.song_b.clone());
        state.matches.push(m);
    }

    pub fn match_by_id(&self, id: &str) -> Match {
        let state = self.state.lock().unwrap();
        state
            .matches
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("no match {id}"))
    }

    pub fn match_on(&self, day: u32, id: &str) -> Match {
        let state = self.state.lock().unwrap();
        state
            .matches
            .iter()
            .find(|m| m.day == day && m.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("no match {id} on day {day}"))
    }

    pub fn tally_of(&self, id: &str) -> MatchTally {
        self.match_by_id(id).tally
    }

    pub fn winner_of(&self, id: &str) -> Option<Song> {
        self.match_by_id(id).winner
    }

    pub fn force_winner(&self, id: &str, choice: Choice) {
        let mut state = self.state.lock().unwrap();
        let m = state.matches.iter_mut().find(|m| m.id == id).unwrap();
        m.winner = Some(m.song(choice).clone());
    }

    fn check_writes(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        Ok(())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_song_by_id(&self, id: &str) -> anyhow::Result<Option<Song>> {
        Ok(self.state.lock().unwrap().songs.get(id).cloned())
    }

    async fn get_match_by_id(&self, day: u32, id: &str) -> anyhow::Result<Option<Match>> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .matches
            .iter()
            .find(|m| m.day == day && m.id == id)
            .cloned())
    }

    async fn get_match_by_message(&self, message_id: &str) -> anyhow::Result<Option<Match>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .matches
            .iter()
            .find(|m| m.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn set_match_voters(
        &self,
        day: u32,
        match_id: &str,
        tally: &MatchTally,
    ) -> anyhow::Result<()> {
        self.check_writes()?;
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state
            .matches
            .iter_mut()
            .find(|m| m.day == day && m.id == match_id)
        {
            m.tally = tally.clone();
        }
        Ok(())
    }

    async fn set_match_winner(&self, day: u32, match_id: &str, song_id: &str) -> anyhow::Result<bool> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        let Some(m) = state
            .matches
            .iter_mut()
            .find(|m| m.day == day && m.id == match_id)
        else {
            bail!("no match {match_id} on day {day}");
        };
        if m.winner.is_some() {
            return Ok(false);
        }
        let song = if m.song_a.id == song_id {
            m.song_a.clone()
        } else {
            m.song_b.clone()
        };
        m.winner = Some(song);
        Ok(true)
    }

    async fn get_num_completed_matches(&self, day: u32, round: u32) -> anyhow::Result<usize> {
        let state = self.state.lock().unwrap();
        Ok(state
            .matches
            .iter()
            .filter(|m| m.day == day && m.round == round && m.winner.is_some())
            .count())
    }

    async fn get_previous_round_winners(&self, day: u32, round: u32) -> anyhow::Result<Vec<Song>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .matches
            .iter()
            .filter(|m| m.day == day && m.round == round)
            .filter_map(|m| m.winner.clone())
            .collect())
    }

    async fn claim_round_advance(&self, day: u32, round: u32) -> anyhow::Result<bool> {
        self.check_writes()?;
        Ok(self.state.lock().unwrap().advanced.insert((day, round)))
    }

    async fn create_match(
        &self,
        day: u32,
        round: u32,
        song_a: &Song,
        song_b: &Song,
    ) -> anyhow::Result<Match> {
        self.check_writes()?;
        let m = Match::new(day, round, song_a.clone(), song_b.clone());
        self.insert(m.clone());
        Ok(m)
    }

    async fn attach_message(&self, day: u32, match_id: &str, message_id: &str) -> anyhow::Result<()> {
        self.check_writes()?;
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state
            .matches
            .iter_mut()
            .find(|m| m.day == day && m.id == match_id)
        {
            m.message_id = Some(message_id.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chat venue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct VenueState {
    /// (message id, emoji) -> holders in reaction order.
    reactions: HashMap<(String, String), Vec<ChatUser>>,
    removed_markers: Vec<(String, Choice, String)>,
    cleared: Vec<(String, String)>,
    deleted: Vec<String>,
    sent: Vec<(String, String)>,
    next_message: u64,
}

/// Chat venue that keeps reactions in memory and records every call.
#[derive(Default)]
pub struct FakeVenue {
    state: Mutex<VenueState>,
}

impl FakeVenue {
    /// A user clicks a reaction.
    pub fn press(&self, message: &MessageRef, who: &ChatUser, emoji: &str) {
        let mut state = self.state.lock().unwrap();
        let holders = state
            .reactions
            .entry((message.message_id.clone(), emoji.to_string()))
            .or_default();
        if !holders.iter().any(|u| u.id == who.id) {
            holders.push(who.clone());
        }
    }

    /// A user takes a reaction back.
    pub fn unpress(&self, message: &MessageRef, user_id: &str, emoji: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(holders) = state
            .reactions
            .get_mut(&(message.message_id.clone(), emoji.to_string()))
        {
            holders.retain(|u| u.id != user_id);
        }
    }

    pub fn removed_markers(&self) -> Vec<(String, Choice, String)> {
        self.state.lock().unwrap().removed_markers.clone()
    }

    pub fn cleared(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().cleared.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn sent_to(&self, channel: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatVenue for FakeVenue {
    async fn marker_holders(
        &self,
        message: &MessageRef,
        choice: Choice,
    ) -> anyhow::Result<Vec<ChatUser>> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .reactions
            .get(&(message.message_id.clone(), choice.marker().to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_marker(
        &self,
        message: &MessageRef,
        choice: Choice,
        user_id: &str,
    ) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.unpress(message, user_id, choice.marker());
        self.state.lock().unwrap().removed_markers.push((
            message.message_id.clone(),
            choice,
            user_id.to_string(),
        ));
        Ok(())
    }

    async fn clear_reaction(&self, message: &MessageRef, emoji: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .reactions
            .remove(&(message.message_id.clone(), emoji.to_string()));
        state
            .cleared
            .push((message.message_id.clone(), emoji.to_string()));
        Ok(())
    }

    async fn add_marker(&self, message: &MessageRef, choice: Choice) -> anyhow::Result<()> {
        self.press(message, &bot_user(), choice.marker());
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.deleted.push(message.message_id.clone());
        state
            .reactions
            .retain(|(message_id, _), _| *message_id != message.message_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_message += 1;
        state.sent.push((channel_id.to_string(), content.to_string()));
        Ok(format!("sent-{}", state.next_message))
    }
}

// ---------------------------------------------------------------------------
// Playlists and seeder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPlaylists {
    removed: Mutex<Vec<(String, String)>>,
    added: Mutex<Vec<(String, String)>>,
    absent: Mutex<HashSet<String>>,
    fail: AtomicBool,
}

impl RecordingPlaylists {
    pub fn removed(&self) -> Vec<(String, String)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }

    /// Make removals of `track_id` report it as already gone.
    pub fn mark_absent(&self, track_id: &str) {
        self.absent.lock().unwrap().insert(track_id.to_string());
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlaylistService for RecordingPlaylists {
    async fn remove_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlaylistError::Failed(anyhow::anyhow!("service unavailable")));
        }
        if self.absent.lock().unwrap().contains(track_id) {
            return Err(PlaylistError::TrackNotFound {
                playlist: playlist.to_string(),
                track_id: track_id.to_string(),
            });
        }
        self.removed
            .lock()
            .unwrap()
            .push((playlist.to_string(), track_id.to_string()));
        Ok(())
    }

    async fn add_track(&self, playlist: &str, track_id: &str) -> Result<(), PlaylistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlaylistError::Failed(anyhow::anyhow!("service unavailable")));
        }
        self.added
            .lock()
            .unwrap()
            .push((playlist.to_string(), track_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSeeder {
    calls: Mutex<Vec<(Vec<String>, u32, u32)>>,
    fail: AtomicBool,
}

impl RecordingSeeder {
    /// (winner ids, day, round) per call.
    pub fn calls(&self) -> Vec<(Vec<String>, u32, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoundSeeder for RecordingSeeder {
    async fn seed_round(&self, winners: &[Song], day: u32, round: u32) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("vote channel unavailable");
        }
        let ids = winners.iter().map(|s| s.id.clone()).collect();
        self.calls.lock().unwrap().push((ids, day, round));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub venue: Arc<FakeVenue>,
    pub playlists: Arc<RecordingPlaylists>,
    pub seeder: Arc<RecordingSeeder>,
}

impl Harness {
    pub fn new(votes_to_win: usize) -> Self {
        let store = Arc::new(MemoryStore::default());
        let venue = Arc::new(FakeVenue::default());
        let playlists = Arc::new(RecordingPlaylists::default());
        let seeder = Arc::new(RecordingSeeder::default());
        let config = EngineConfig {
            votes_to_win,
            mention_role: "role-1".to_string(),
            vote_channel: VOTE_CHANNEL.to_string(),
            announce_channel: ANNOUNCE_CHANNEL.to_string(),
            voting_playlist: VOTING_PLAYLIST.to_string(),
            winners_playlist: WINNERS_PLAYLIST.to_string(),
        };
        let engine = Engine::new(
            config,
            store.clone(),
            venue.clone(),
            playlists.clone(),
            seeder.clone(),
        );
        Harness {
            engine,
            store,
            venue,
            playlists,
            seeder,
        }
    }

    /// Store an open, posted match and return its message.
    pub fn open_match(&self, day: u32, round: u32, (a, b): (&str, &str)) -> MessageRef {
        let mut m = Match::new(day, round, song_for(a), song_for(b));
        let message = MessageRef::new(VOTE_CHANNEL, format!("msg-{day}-{}", m.id));
        m.message_id = Some(message.message_id.clone());
        self.store.insert(m);
        message
    }

    /// `who` clicks `choice` and the venue reports it.
    pub async fn cast(
        &self,
        message: &MessageRef,
        who: &str,
        choice: Choice,
    ) -> Result<VoteOutcome, EngineError> {
        let voter = user(who);
        self.venue.press(message, &voter, choice.marker());
        self.engine
            .handle_vote(added(message, &voter, choice.marker()))
            .await
    }
}
