//! DuckDB-backed relational store for events, players and games.
//!
//! Every write is an idempotent "ensure exists" keyed on the natural key of
//! its table, so re-running an ingestion over the same archive never creates
//! duplicates. The helpers take a plain `&Connection`, which lets the loader
//! run them either directly or inside a per-game transaction.

use super::config::DatabaseLocation;
use super::error::Result;
use super::types::{EventDate, GameResult};
use duckdb::{Connection, OptionalExt, params};

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS events_seq START 1;
CREATE TABLE IF NOT EXISTS events (
    event_id BIGINT PRIMARY KEY DEFAULT nextval('events_seq'),
    name VARCHAR NOT NULL,
    site VARCHAR NOT NULL,
    date DATE NOT NULL,
    UNIQUE (name, site, date)
);

CREATE SEQUENCE IF NOT EXISTS players_seq START 1;
CREATE TABLE IF NOT EXISTS players (
    player_id BIGINT PRIMARY KEY DEFAULT nextval('players_seq'),
    name VARCHAR NOT NULL UNIQUE,
    elo INTEGER NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS games_seq START 1;
CREATE TABLE IF NOT EXISTS games (
    game_id BIGINT PRIMARY KEY DEFAULT nextval('games_seq'),
    round VARCHAR NOT NULL,
    result VARCHAR NOT NULL,
    moves VARCHAR NOT NULL,
    white_player_id BIGINT NOT NULL REFERENCES players (player_id),
    black_player_id BIGINT NOT NULL REFERENCES players (player_id),
    event_id BIGINT NOT NULL REFERENCES events (event_id),
    UNIQUE (round, result, moves, white_player_id, black_player_id, event_id)
);
"#;

/// Owns the store connection for one top-level operation. The connection is
/// closed when the `Store` is dropped.
pub struct Store {
    conn: Connection,
}

/// Row counts of the three tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub events: u64,
    pub players: u64,
    pub games: u64,
}

impl Store {
    pub fn open(location: &DatabaseLocation) -> Result<Self> {
        let conn = match location {
            DatabaseLocation::InMemory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => Connection::open(path)?,
        };
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseLocation::InMemory)
    }

    /// Wraps an existing connection, creating the schema if it is missing.
    pub fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        Ok(TableCounts {
            events: count("events")?,
            players: count("players")?,
            games: count("games")?,
        })
    }

    /// Stored rating of a player, if the player exists.
    pub fn player_elo(&self, name: &str) -> Result<Option<i32>> {
        Ok(self
            .conn
            .query_row(
                "SELECT elo FROM players WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Inserts the event unless the (name, site, date) triple already exists.
pub(crate) fn ensure_event(conn: &Connection, name: &str, site: &str, date: EventDate) -> Result<()> {
    conn.execute(
        "INSERT INTO events (name, site, date) VALUES (?, ?, CAST(? AS DATE)) \
         ON CONFLICT DO NOTHING",
        params![name, site, date.to_store_value()],
    )?;
    Ok(())
}

/// Inserts the player, or raises the stored rating when `elo` is higher.
pub(crate) fn ensure_player(conn: &Connection, name: &str, elo: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO players (name, elo) VALUES (?, ?) \
         ON CONFLICT (name) DO UPDATE SET elo = excluded.elo \
         WHERE excluded.elo > players.elo",
        params![name, elo],
    )?;
    Ok(())
}

pub(crate) fn event_id(conn: &Connection, name: &str, site: &str, date: EventDate) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT event_id FROM events WHERE name = ? AND site = ? AND date = CAST(? AS DATE)",
        params![name, site, date.to_store_value()],
        |row| row.get(0),
    )?)
}

pub(crate) fn player_id(conn: &Connection, name: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT player_id FROM players WHERE name = ?",
        params![name],
        |row| row.get(0),
    )?)
}

/// Natural key of a stored game.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GameKey<'a> {
    pub round: &'a str,
    pub result: GameResult,
    pub moves: &'a str,
    pub white_player_id: i64,
    pub black_player_id: i64,
    pub event_id: i64,
}

/// Inserts the game; returns `false` when an identical row already existed.
pub(crate) fn insert_game(conn: &Connection, game: &GameKey<'_>) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO games (round, result, moves, white_player_id, black_player_id, event_id) \
         VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT DO NOTHING",
        params![
            game.round,
            game.result.code(),
            game.moves,
            game.white_player_id,
            game.black_player_id,
            game.event_id
        ],
    )?;
    Ok(inserted > 0)
}
