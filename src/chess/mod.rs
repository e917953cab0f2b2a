//! PGN ingestion into a DuckDB archive of events, players and games.
//!
//! The flow is leaf-first: [`visitor`] tokenizes one game block, [`reader`]
//! turns PGN text into validated [`types::GameRecord`]s, [`loader`] persists
//! them through [`store`], and [`query`] reads them back as a text report.

pub mod config;
pub mod error;
pub mod loader;
pub mod log;
pub mod normalize;
pub mod query;
pub mod reader;
pub mod store;
pub mod types;
pub mod visitor;

pub use self::config::{DatabaseLocation, Settings};
pub use self::error::{Error, ErrorAccumulator, Result};
pub use self::loader::{
    ChannelProgress, IngestProgress, IngestReport, LoadStats, Loader, NoProgress, ProgressSink,
};
pub use self::log::init_logging;
pub use self::query::{DateRange, GameFilter, QueryReport};
pub use self::reader::{Compression, ParseOutcome, Rejection, parse_pgn};
pub use self::store::{Store, TableCounts};
pub use self::types::{EventDate, GameRecord, GameResult};
