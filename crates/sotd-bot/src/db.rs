// SQLite persistence layer for songs, matches and round progress.

use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use sotd_core::bracket::{Match, MatchTally, Song};
use sotd_core::ports::MatchStore;

/// Columns shared by every match lookup. The winner join is optional since
/// open matches have no winner yet.
const MATCH_SELECT: &str = "
    SELECT m.id, m.day, m.round,
           a.id, a.name, a.artists,
           b.id, b.name, b.artists,
           m.voters,
           w.id, w.name, w.artists,
           m.message_id
    FROM matches m
    JOIN songs a ON a.id = m.song_a_id
    JOIN songs b ON b.id = m.song_b_id
    LEFT JOIN songs w ON w.id = m.winner_id";

/// SQLite-backed [`MatchStore`].
pub struct Database {
    conn: Mutex<Connection>,
}

/// A match row before the voter JSON is decoded.
struct MatchRow {
    id: String,
    day: u32,
    round: u32,
    song_a: Song,
    song_b: Song,
    voters: String,
    winner: Option<Song>,
    message_id: Option<String>,
}

impl MatchRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let winner_id: Option<String> = row.get(10)?;
        let winner = match winner_id {
            Some(id) => Some(Song {
                id,
                name: row.get(11)?,
                artists: row.get(12)?,
            }),
            None => None,
        };
        Ok(MatchRow {
            id: row.get(0)?,
            day: row.get(1)?,
            round: row.get(2)?,
            song_a: Song {
                id: row.get(3)?,
                name: row.get(4)?,
                artists: row.get(5)?,
            },
            song_b: Song {
                id: row.get(6)?,
                name: row.get(7)?,
                artists: row.get(8)?,
            },
            voters: row.get(9)?,
            winner,
            message_id: row.get(13)?,
        })
    }

    fn into_match(self) -> Result<Match> {
        let tally: MatchTally = serde_json::from_str(&self.voters)
            .with_context(|| format!("corrupt voter list for match {}", self.id))?;
        Ok(Match {
            id: self.id,
            day: self.day,
            round: self.round,
            song_a: self.song_a,
            song_b: self.song_b,
            tally,
            winner: self.winner,
            message_id: self.message_id,
        })
    }
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS songs (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL,
                artists TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS matches (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL,
                day        INTEGER NOT NULL,
                round      INTEGER NOT NULL,
                song_a_id  TEXT NOT NULL REFERENCES songs(id),
                song_b_id  TEXT NOT NULL REFERENCES songs(id),
                voters     TEXT NOT NULL,
                winner_id  TEXT REFERENCES songs(id),
                message_id TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(day, id)
            );

            CREATE TABLE IF NOT EXISTS round_advances (
                day         INTEGER NOT NULL,
                round       INTEGER NOT NULL,
                advanced_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (day, round)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_message ON matches(message_id);
            CREATE INDEX IF NOT EXISTS idx_matches_day_round ON matches(day, round);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Insert a song or refresh its name and artists.
    pub fn upsert_song(&self, song: &Song) -> Result<()> {
        upsert_song(&self.conn(), song)
    }

    pub fn song(&self, id: &str) -> Result<Option<Song>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, artists FROM songs WHERE id = ?1",
            params![id],
            |row| {
                Ok(Song {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artists: row.get(2)?,
                })
            },
        )
        .optional()
        .context("failed to query song")
    }

    /// Match ids repeat across days when a pairing comes up again, so a match
    /// is addressed by `(day, id)`.
    pub fn match_by_id(&self, day: u32, id: &str) -> Result<Option<Match>> {
        let conn = self.conn();
        let sql = format!("{MATCH_SELECT} WHERE m.day = ?1 AND m.id = ?2");
        let row = conn
            .query_row(&sql, params![day, id], MatchRow::from_row)
            .optional()
            .context("failed to query match")?;
        row.map(MatchRow::into_match).transpose()
    }

    pub fn match_by_message(&self, message_id: &str) -> Result<Option<Match>> {
        let conn = self.conn();
        let sql = format!("{MATCH_SELECT} WHERE m.message_id = ?1 ORDER BY m.seq DESC LIMIT 1");
        let row = conn
            .query_row(&sql, params![message_id], MatchRow::from_row)
            .optional()
            .context("failed to query match")?;
        row.map(MatchRow::into_match).transpose()
    }

    /// All matches of a round in creation order.
    pub fn round_matches(&self, day: u32, round: u32) -> Result<Vec<Match>> {
        let conn = self.conn();
        let sql = format!("{MATCH_SELECT} WHERE m.day = ?1 AND m.round = ?2 ORDER BY m.seq");
        let mut stmt = conn
            .prepare(&sql)
            .context("failed to prepare round_matches query")?;
        let rows = stmt
            .query_map(params![day, round], MatchRow::from_row)
            .context("failed to query round matches")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map match rows")?;
        rows.into_iter().map(MatchRow::into_match).collect()
    }

    pub fn save_voters(&self, day: u32, match_id: &str, tally: &MatchTally) -> Result<()> {
        let voters = serde_json::to_string(tally).context("failed to serialize voters")?;
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE matches SET voters = ?3 WHERE day = ?1 AND id = ?2",
                params![day, match_id, voters],
            )
            .context("failed to update voters")?;
        if changed == 0 {
            bail!("no match {match_id} on day {day}");
        }
        Ok(())
    }

    /// Set the winner unless one is already recorded. The conditional update
    /// makes this a single atomic check-and-set.
    pub fn try_set_winner(&self, day: u32, match_id: &str, song_id: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE matches SET winner_id = ?3
                 WHERE day = ?1 AND id = ?2 AND winner_id IS NULL",
                params![day, match_id, song_id],
            )
            .context("failed to set match winner")?;
        Ok(changed == 1)
    }

    pub fn completed_matches(&self, day: u32, round: u32) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM matches
                 WHERE day = ?1 AND round = ?2 AND winner_id IS NOT NULL",
                params![day, round],
                |row| row.get(0),
            )
            .context("failed to count completed matches")?;
        Ok(count as usize)
    }

    pub fn round_winners(&self, day: u32, round: u32) -> Result<Vec<Song>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT w.id, w.name, w.artists
                 FROM matches m JOIN songs w ON w.id = m.winner_id
                 WHERE m.day = ?1 AND m.round = ?2
                 ORDER BY m.seq",
            )
            .context("failed to prepare round_winners query")?;
        let winners = stmt
            .query_map(params![day, round], |row| {
                Ok(Song {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artists: row.get(2)?,
                })
            })
            .context("failed to query round winners")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map winner rows")?;
        Ok(winners)
    }

    /// Record that `(day, round)` has advanced. Returns `false` if it already had.
    pub fn try_claim_advance(&self, day: u32, round: u32) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO round_advances (day, round) VALUES (?1, ?2)",
                params![day, round],
            )
            .context("failed to claim round advance")?;
        Ok(changed == 1)
    }

    /// Insert an open match, upserting both songs first.
    pub fn insert_match(&self, day: u32, round: u32, song_a: &Song, song_b: &Song) -> Result<Match> {
        let created = Match::new(day, round, song_a.clone(), song_b.clone());
        let voters =
            serde_json::to_string(&created.tally).context("failed to serialize voters")?;

        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        upsert_song(&tx, song_a)?;
        upsert_song(&tx, song_b)?;
        tx.execute(
            "INSERT INTO matches (id, day, round, song_a_id, song_b_id, voters)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![created.id, day, round, song_a.id, song_b.id, voters],
        )
        .with_context(|| format!("failed to insert match {}", created.id))?;
        tx.commit().context("failed to commit match insert")?;

        Ok(created)
    }

    pub fn set_message(&self, day: u32, match_id: &str, message_id: &str) -> Result<()> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE matches SET message_id = ?3 WHERE day = ?1 AND id = ?2",
                params![day, match_id, message_id],
            )
            .context("failed to attach message")?;
        if changed == 0 {
            bail!("no match {match_id} on day {day}");
        }
        Ok(())
    }
}

fn upsert_song(conn: &Connection, song: &Song) -> Result<()> {
    conn.execute(
        "INSERT INTO songs (id, name, artists) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, artists = excluded.artists",
        params![song.id, song.name, song.artists],
    )
    .with_context(|| format!("failed to upsert song {}", song.id))?;
    Ok(())
}

#[async_trait]
impl MatchStore for Database {
    async fn get_song_by_id(&self, id: &str) -> Result<Option<Song>> {
        self.song(id)
    }

    async fn get_match_by_id(&self, day: u32, id: &str) -> Result<Option<Match>> {
        self.match_by_id(day, id)
    }

    async fn get_match_by_message(&self, message_id: &str) -> Result<Option<Match>> {
        self.match_by_message(message_id)
    }

    async fn set_match_voters(&self, day: u32, match_id: &str, tally: &MatchTally) -> Result<()> {
        self.save_voters(day, match_id, tally)
    }

    async fn set_match_winner(&self, day: u32, match_id: &str, song_id: &str) -> Result<bool> {
        self.try_set_winner(day, match_id, song_id)
    }

    async fn get_num_completed_matches(&self, day: u32, round: u32) -> Result<usize> {
        self.completed_matches(day, round)
    }

    async fn get_previous_round_winners(&self, day: u32, round: u32) -> Result<Vec<Song>> {
        self.round_winners(day, round)
    }

    async fn claim_round_advance(&self, day: u32, round: u32) -> Result<bool> {
        self.try_claim_advance(day, round)
    }

    async fn create_match(
        &self,
        day: u32,
        round: u32,
        song_a: &Song,
        song_b: &Song,
    ) -> Result<Match> {
        self.insert_match(day, round, song_a, song_b)
    }

    async fn attach_message(&self, day: u32, match_id: &str, message_id: &str) -> Result<()> {
        self.set_message(day, match_id, message_id)
    }
}
