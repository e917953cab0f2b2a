pub mod chess;

pub use chess::{
    ChannelProgress, Compression, DatabaseLocation, DateRange, Error, EventDate, GameFilter,
    GameRecord, GameResult, IngestProgress, IngestReport, LoadStats, Loader, NoProgress,
    ParseOutcome, ProgressSink, QueryReport, Rejection, Result, Settings, Store, TableCounts,
    init_logging, parse_pgn,
};
pub use tokio_util::sync::CancellationToken;
