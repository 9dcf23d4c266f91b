// Opens rounds in chat: creates the match records, posts one message per
// match to the voting channel and seeds it with both markers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use sotd_core::bracket::{
    matches_in_round, pair_winners, round_label, Choice, Match, Song, TournamentShape,
};
use sotd_core::ports::{ChatVenue, MatchStore, MessageRef, PlaylistService, RoundSeeder};

/// [`RoundSeeder`] that posts matches to a chat channel.
pub struct ChatRoundSeeder {
    store: Arc<dyn MatchStore>,
    venue: Arc<dyn ChatVenue>,
    playlists: Arc<dyn PlaylistService>,
    vote_channel: String,
    voting_playlist: String,
}

impl ChatRoundSeeder {
    pub fn new(
        store: Arc<dyn MatchStore>,
        venue: Arc<dyn ChatVenue>,
        playlists: Arc<dyn PlaylistService>,
        vote_channel: impl Into<String>,
        voting_playlist: impl Into<String>,
    ) -> Self {
        Self {
            store,
            venue,
            playlists,
            vote_channel: vote_channel.into(),
            voting_playlist: voting_playlist.into(),
        }
    }

    /// Start `day` with `songs` as entrants, in bracket order.
    ///
    /// Every entrant goes on the voting playlist, then the opening round is
    /// posted. Returns the shape of the day's tournament.
    pub async fn start_day(&self, songs: &[Song], day: u32) -> Result<TournamentShape> {
        let shape = TournamentShape::for_entrants(songs.len())?;

        let mut seen = HashSet::new();
        if let Some(dup) = songs.iter().find(|s| !seen.insert(s.id.as_str())) {
            bail!("song {} is entered twice on day {day}", dup.id);
        }

        let schedule: Vec<String> = shape.rounds().map(round_label).collect();
        info!(
            day,
            entrants = shape.entrants(),
            opening_round = shape.opening_round(),
            schedule = %schedule.join(", "),
            "starting day"
        );

        for song in songs {
            self.playlists
                .add_track(&self.voting_playlist, &song.id)
                .await
                .with_context(|| format!("failed to add {} to the voting playlist", song.id))?;
        }

        self.seed_round(songs, day, shape.opening_round()).await?;
        Ok(shape)
    }

    async fn open_match(&self, day: u32, round: u32, song_a: &Song, song_b: &Song) -> Result<Match> {
        let mut created = self.store.create_match(day, round, song_a, song_b).await?;

        let content = render_match(&created);
        let message_id = self
            .venue
            .send_message(&self.vote_channel, &content)
            .await
            .with_context(|| format!("failed to post match {}", created.id))?;

        // Attach before seeding markers so early voters already resolve.
        self.store
            .attach_message(created.day, &created.id, &message_id)
            .await?;

        let message = MessageRef::new(self.vote_channel.as_str(), message_id.as_str());
        for choice in [Choice::A, Choice::B] {
            self.venue
                .add_marker(&message, choice)
                .await
                .with_context(|| format!("failed to seed {choice} on match {}", created.id))?;
        }

        debug!(match_id = %created.id, message = %message_id, "match posted");
        created.message_id = Some(message_id);
        Ok(created)
    }
}

#[async_trait]
impl RoundSeeder for ChatRoundSeeder {
    async fn seed_round(&self, winners: &[Song], day: u32, round: u32) -> Result<()> {
        let pairs = pair_winners(winners)?;
        let expected = matches_in_round(round)?;
        if pairs.len() != expected {
            bail!(
                "{} songs cannot fill the {} of day {day} ({expected} matches)",
                winners.len(),
                round_label(round)
            );
        }

        for (song_a, song_b) in &pairs {
            self.open_match(day, round, song_a, song_b).await?;
        }

        info!(day, round, matches = pairs.len(), "round seeded");
        Ok(())
    }
}

/// Chat text for a freshly opened match.
pub fn render_match(m: &Match) -> String {
    format!(
        "Day {day}, {label}\n{a_marker} {a}\n{b_marker} {b}",
        day = m.day,
        label = round_label(m.round),
        a_marker = Choice::A.marker(),
        a = m.song_a.credit(),
        b_marker = Choice::B.marker(),
        b = m.song_b.credit(),
    )
}
