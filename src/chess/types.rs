use chrono::NaiveDate;
use std::fmt;

/// Outcome of a game as stored in the `games.result` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

impl GameResult {
    /// Maps a PGN result string. Anything other than a decisive or drawn
    /// marker (including `*`, malformed or empty input) maps to `Draw`.
    pub fn from_pgn(raw: &str) -> Self {
        match raw.trim() {
            "1-0" => Self::WhiteWin,
            "0-1" => Self::BlackWin,
            _ => Self::Draw,
        }
    }

    /// Single-letter code persisted in the store and accepted by query filters.
    pub const fn code(self) -> &'static str {
        match self {
            Self::WhiteWin => "W",
            Self::BlackWin => "B",
            Self::Draw => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "W" => Some(Self::WhiteWin),
            "B" => Some(Self::BlackWin),
            "D" => Some(Self::Draw),
            _ => None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Event date; `Unknown` when no tag held a complete `YYYY.MM.DD` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventDate {
    Known(NaiveDate),
    Unknown,
}

impl EventDate {
    /// Date written to the store for `Unknown`. Keeps the (name, site, date)
    /// key comparable, which a NULL would not be.
    pub const SENTINEL: &'static str = "0001-01-01";

    /// ISO form used as a bound parameter.
    pub fn to_store_value(self) -> String {
        match self {
            Self::Known(date) => date.format("%Y-%m-%d").to_string(),
            Self::Unknown => Self::SENTINEL.to_string(),
        }
    }

    /// Inverse of [`EventDate::to_store_value`].
    pub fn from_store_value(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == Self::SENTINEL {
            return Self::Unknown;
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Self::Known)
            .unwrap_or(Self::Unknown)
    }

    pub fn known(self) -> Option<NaiveDate> {
        match self {
            Self::Known(date) => Some(date),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Unknown => f.write_str("????-??-??"),
        }
    }
}

/// One parsed game, built from a single PGN block and never mutated after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    event: String,
    site: String,
    date: EventDate,
    round: String,
    white: String,
    black: String,
    white_elo: i32,
    black_elo: i32,
    result: GameResult,
    movetext: String,
}

/// Field values gathered by the parser before a record is frozen.
#[derive(Debug, Clone)]
pub(crate) struct GameRecordParts {
    pub event: String,
    pub site: String,
    pub date: EventDate,
    pub round: String,
    pub white: String,
    pub black: String,
    pub white_elo: i32,
    pub black_elo: i32,
    pub result: GameResult,
    pub movetext: String,
}

impl From<GameRecordParts> for GameRecord {
    fn from(parts: GameRecordParts) -> Self {
        Self {
            event: parts.event,
            site: parts.site,
            date: parts.date,
            round: parts.round,
            white: parts.white,
            black: parts.black,
            white_elo: parts.white_elo,
            black_elo: parts.black_elo,
            result: parts.result,
            movetext: parts.movetext,
        }
    }
}

impl GameRecord {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn date(&self) -> EventDate {
        self.date
    }

    pub fn round(&self) -> &str {
        &self.round
    }

    pub fn white(&self) -> &str {
        &self.white
    }

    pub fn black(&self) -> &str {
        &self.black
    }

    pub fn white_elo(&self) -> i32 {
        self.white_elo
    }

    pub fn black_elo(&self) -> i32 {
        self.black_elo
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn movetext(&self) -> &str {
        &self.movetext
    }
}
