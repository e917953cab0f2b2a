use super::error::{Error, Result};
use super::loader::Loader;
use super::reader::Compression;
use super::store::Store;
use std::env;
use std::path::PathBuf;

const IN_MEMORY: &str = ":memory:";

/// Where the store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabaseLocation {
    #[default]
    InMemory,
    File(PathBuf),
}

impl DatabaseLocation {
    fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(Error::config("CHESS_DB", "empty database path"));
        }
        if s.eq_ignore_ascii_case(IN_MEMORY) {
            Ok(Self::InMemory)
        } else {
            Ok(Self::File(PathBuf::from(s)))
        }
    }
}

/// Runtime settings for ingestion and queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: DatabaseLocation,
    pub compression: Compression,
    /// Wrap the writes of each game in one transaction.
    pub transaction_per_game: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::InMemory,
            compression: Compression::Auto,
            transaction_per_game: true,
        }
    }
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(name, format!("expected a boolean, got '{other}'"))),
    }
}

impl Settings {
    /// Reads `CHESS_DB`, `CHESS_PGN_COMPRESSION` and `CHESS_TXN_PER_GAME`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(raw) = lookup("CHESS_DB") {
            settings.database = DatabaseLocation::parse(&raw)?;
        }
        if let Some(raw) = lookup("CHESS_PGN_COMPRESSION") {
            settings.compression = Compression::parse(&raw)
                .map_err(|message| Error::config("CHESS_PGN_COMPRESSION", message))?;
        }
        if let Some(raw) = lookup("CHESS_TXN_PER_GAME") {
            settings.transaction_per_game = parse_flag("CHESS_TXN_PER_GAME", &raw)?;
        }

        Ok(settings)
    }

    pub fn open_store(&self) -> Result<Store> {
        Store::open(&self.database)
    }

    pub fn loader<'s>(&self, store: &'s mut Store) -> Loader<'s> {
        Loader::new(store)
            .compression(self.compression)
            .transaction_per_game(self.transaction_per_game)
    }
}
