use super::{
    error::{Error, Result},
    reader::{Compression, Rejection, expand_paths, parse_pgn, read_pgn_file},
    store::{GameKey, Store, ensure_event, ensure_player, event_id, insert_game, player_id},
    types::GameRecord,
};
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{SyncSender, TrySendError};
use tokio_util::sync::CancellationToken;

/// Progress updates emitted while games are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    /// Loading is about to start; `total` games will be processed.
    Started { total: usize },
    /// One more game has been persisted (or found to exist already).
    GameCompleted { completed: usize, total: usize },
    Finished { completed: usize },
}

impl IngestProgress {
    /// Fraction of work done (0.0 to 1.0) when known.
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Self::GameCompleted { completed, total } if total > 0 => {
                Some(completed as f64 / total as f64)
            }
            Self::Finished { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// Receives progress updates. Implemented for closures and for
/// [`ChannelProgress`].
pub trait ProgressSink {
    fn report(&mut self, progress: IngestProgress);
}

impl<F: FnMut(IngestProgress)> ProgressSink for F {
    fn report(&mut self, progress: IngestProgress) {
        self(progress)
    }
}

/// Forwards progress into a bounded channel.
///
/// `Started` and `GameCompleted` updates are dropped rather than waited on
/// when the channel is full, so a slow consumer never stalls the load.
/// `Finished` is always delivered and blocks until the channel has room, so
/// the receiver must be drained while the load runs.
pub struct ChannelProgress(pub SyncSender<IngestProgress>);

impl ProgressSink for ChannelProgress {
    fn report(&mut self, progress: IngestProgress) {
        if let IngestProgress::Finished { .. } = progress {
            if self.0.send(progress).is_err() {
                log::trace!("progress channel closed");
            }
            return;
        }
        match self.0.try_send(progress) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("progress channel full, dropping update"),
            Err(TrySendError::Disconnected(_)) => log::trace!("progress channel closed"),
        }
    }
}

/// Sink that ignores every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _: IngestProgress) {}
}

/// Outcome of persisting a sequence of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub processed: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Result of ingesting one or more PGN files.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files: Vec<PathBuf>,
    /// Files that matched a pattern but could not be read.
    pub skipped_files: Vec<PathBuf>,
    pub games_parsed: usize,
    pub games_processed: usize,
    pub games_inserted: usize,
    pub duplicates_skipped: usize,
    pub errors: Vec<Rejection>,
}

/// Persists parsed games, one after another, into a [`Store`].
pub struct Loader<'s> {
    store: &'s mut Store,
    compression: Compression,
    transaction_per_game: bool,
}

fn check_cancelled(cancel: &CancellationToken, processed: usize) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled { processed })
    } else {
        Ok(())
    }
}

/// Runs the ensure-exists steps for one game. Returns whether a new game row
/// was written.
fn store_game(
    conn: &Connection,
    game: &GameRecord,
    cancel: &CancellationToken,
    processed: usize,
) -> Result<bool> {
    ensure_event(conn, game.event(), game.site(), game.date())?;
    check_cancelled(cancel, processed)?;
    ensure_player(conn, game.white(), game.white_elo())?;
    ensure_player(conn, game.black(), game.black_elo())?;
    check_cancelled(cancel, processed)?;

    let row = GameKey {
        round: game.round(),
        result: game.result(),
        moves: game.movetext(),
        white_player_id: player_id(conn, game.white())?,
        black_player_id: player_id(conn, game.black())?,
        event_id: event_id(conn, game.event(), game.site(), game.date())?,
    };
    insert_game(conn, &row)
}

impl<'s> Loader<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            compression: Compression::Auto,
            transaction_per_game: true,
        }
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn transaction_per_game(mut self, enabled: bool) -> Self {
        self.transaction_per_game = enabled;
        self
    }

    fn store_one(&mut self, game: &GameRecord, cancel: &CancellationToken, processed: usize) -> Result<bool> {
        if !self.transaction_per_game {
            return store_game(self.store.connection(), game, cancel, processed);
        }

        let tx = self.store.connection_mut().transaction()?;
        let inserted = store_game(&tx, game, cancel, processed)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Persists `games` in order.
    ///
    /// The first store failure aborts the remaining batch; games persisted
    /// before it stay committed.
    pub fn ingest_records(
        &mut self,
        games: &[GameRecord],
        sink: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<LoadStats> {
        let total = games.len();
        let mut stats = LoadStats::default();
        sink.report(IngestProgress::Started { total });

        for game in games {
            check_cancelled(cancel, stats.processed)?;

            let inserted = self.store_one(game, cancel, stats.processed).inspect_err(|e| {
                log::error!(
                    "Aborting load after {} of {total} games: {e}",
                    stats.processed
                );
            })?;

            stats.processed += 1;
            if inserted {
                stats.inserted += 1;
            } else {
                stats.duplicates += 1;
                log::debug!(
                    "Game already stored: {} vs {}, round {}",
                    game.white(),
                    game.black(),
                    game.round()
                );
            }

            sink.report(IngestProgress::GameCompleted {
                completed: stats.processed,
                total,
            });
        }

        sink.report(IngestProgress::Finished {
            completed: stats.processed,
        });
        Ok(stats)
    }

    /// Parses one PGN file and persists every valid game in it.
    pub fn ingest_file(
        &mut self,
        path: impl AsRef<Path>,
        sink: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let path = path.as_ref();
        let text = read_pgn_file(path, self.compression)?;
        let parsed = parse_pgn(&text);

        let mut report = IngestReport {
            files: vec![path.to_path_buf()],
            games_parsed: parsed.games.len(),
            errors: parsed.rejections,
            ..IngestReport::default()
        };
        self.finish(&parsed.games, &mut report, sink, cancel)?;
        Ok(report)
    }

    /// Ingests every file matching `pattern` as a single batch.
    ///
    /// With one matching file, failing to read it is an error. With several,
    /// unreadable files are logged and skipped.
    pub fn ingest_glob(
        &mut self,
        pattern: &str,
        sink: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let paths = expand_paths(pattern)?;
        if paths.is_empty() {
            log::warn!("No PGN files match '{pattern}'");
        }

        let mut report = IngestReport::default();
        let mut games = Vec::new();

        for path in &paths {
            let text = match read_pgn_file(path, self.compression) {
                Ok(text) => text,
                Err(e) if paths.len() > 1 => {
                    log::warn!("{e}");
                    report.skipped_files.push(path.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            let parsed = parse_pgn(&text);
            report.files.push(path.clone());
            report.games_parsed += parsed.games.len();
            report
                .errors
                .extend(parsed.rejections.into_iter().map(|rejection| Rejection {
                    source: Some(path.clone()),
                    ..rejection
                }));
            games.extend(parsed.games);
        }

        self.finish(&games, &mut report, sink, cancel)?;
        Ok(report)
    }

    fn finish(
        &mut self,
        games: &[GameRecord],
        report: &mut IngestReport,
        sink: &mut impl ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let stats = self.ingest_records(games, sink, cancel)?;
        report.games_processed = stats.processed;
        report.games_inserted = stats.inserted;
        report.duplicates_skipped = stats.duplicates;

        log::info!(
            "Ingested {} games ({} new, {} already stored), rejected {}",
            stats.processed,
            stats.inserted,
            stats.duplicates,
            report.errors.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::store::TableCounts;
    use crate::chess::types::{EventDate, GameRecordParts, GameResult};
    use std::sync::mpsc;

    const ALICE_BOB: &str = r#"[Event "Club Open"]
[Site "Salt Lake City"]
[Date "2020.05.16"]
[Round "1"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]
[WhiteElo "2200"]
[BlackElo "2100"]

1.e4 e5 2.Nf3 Nc6 3.Bb5 a6 1-0

[Event "Club Open"]
[Site "Salt Lake City"]
[Date "2020.05.16"]
[Round "2"]
[White "Alice"]
[Black "Bob"]
[Result "0-1"]
[WhiteElo "2350"]
[BlackElo "2100"]

1.d4 d5 2.c4 e6 0-1
"#;

    fn record(white: &str, white_elo: i32, round: &str) -> GameRecord {
        GameRecordParts {
            event: "Test".to_string(),
            site: "Lab".to_string(),
            date: EventDate::Unknown,
            round: round.to_string(),
            white: white.to_string(),
            black: "Bob".to_string(),
            white_elo,
            black_elo: 2100,
            result: GameResult::Draw,
            movetext: "1.e4 1/2-1/2".to_string(),
        }
        .into()
    }

    fn write_pgn(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_two_game_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pgn(dir.path(), "games.pgn", ALICE_BOB);
        let mut store = Store::open_in_memory().unwrap();

        let report = Loader::new(&mut store)
            .ingest_file(&path, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.games_parsed, 2);
        assert_eq!(report.games_processed, 2);
        assert_eq!(report.games_inserted, 2);
        assert!(report.errors.is_empty());

        assert_eq!(
            store.counts().unwrap(),
            TableCounts {
                events: 1,
                players: 2,
                games: 2
            }
        );
        assert_eq!(store.player_elo("Alice").unwrap(), Some(2350));
        assert_eq!(store.player_elo("Bob").unwrap(), Some(2100));
    }

    #[test]
    fn test_reingestion_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pgn(dir.path(), "games.pgn", ALICE_BOB);
        let mut store = Store::open_in_memory().unwrap();
        let cancel = CancellationToken::new();

        Loader::new(&mut store)
            .ingest_file(&path, &mut NoProgress, &cancel)
            .unwrap();
        let before = store.counts().unwrap();

        let second = Loader::new(&mut store)
            .ingest_file(&path, &mut NoProgress, &cancel)
            .unwrap();

        assert_eq!(store.counts().unwrap(), before);
        assert_eq!(second.games_processed, 2);
        assert_eq!(second.games_inserted, 0);
        assert_eq!(second.duplicates_skipped, 2);
        assert_eq!(store.player_elo("Alice").unwrap(), Some(2350));
    }

    #[test]
    fn test_peak_rating_survives_lower_later_rating() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [record("Alice", 2350, "1"), record("Alice", 2200, "2")];

        Loader::new(&mut store)
            .ingest_records(&games, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(store.player_elo("Alice").unwrap(), Some(2350));
        assert_eq!(store.counts().unwrap().games, 2);
    }

    #[test]
    fn test_same_player_on_both_sides() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [record("Bob", 2100, "1")];

        let stats = Loader::new(&mut store)
            .ingest_records(&games, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(store.counts().unwrap().players, 1);
    }

    #[test]
    fn test_without_transactions() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [record("Alice", 2200, "1"), record("Alice", 2300, "2")];

        let stats = Loader::new(&mut store)
            .transaction_per_game(false)
            .ingest_records(&games, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(store.player_elo("Alice").unwrap(), Some(2300));
    }

    #[test]
    fn test_progress_reported_per_game() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [record("Alice", 2200, "1"), record("Carol", 1900, "2")];
        let mut updates = Vec::new();

        Loader::new(&mut store)
            .ingest_records(
                &games,
                &mut |p: IngestProgress| updates.push(p),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(
            updates,
            vec![
                IngestProgress::Started { total: 2 },
                IngestProgress::GameCompleted {
                    completed: 1,
                    total: 2
                },
                IngestProgress::GameCompleted {
                    completed: 2,
                    total: 2
                },
                IngestProgress::Finished { completed: 2 },
            ]
        );
        assert_eq!(updates[1].fraction(), Some(0.5));
        assert_eq!(updates[0].fraction(), None);
    }

    #[test]
    fn test_channel_progress() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [record("Alice", 2200, "1")];
        let (tx, rx) = mpsc::sync_channel(8);

        Loader::new(&mut store)
            .ingest_records(&games, &mut ChannelProgress(tx), &CancellationToken::new())
            .unwrap();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2], IngestProgress::Finished { completed: 1 });
    }

    #[test]
    fn test_channel_progress_always_delivers_finished() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [
            record("Alice", 2200, "1"),
            record("Carol", 1900, "2"),
            record("Dave", 1800, "3"),
        ];
        let (tx, rx) = mpsc::sync_channel(1);
        let consumer = std::thread::spawn(move || rx.iter().collect::<Vec<_>>());

        let mut sink = ChannelProgress(tx);
        Loader::new(&mut store)
            .ingest_records(&games, &mut sink, &CancellationToken::new())
            .unwrap();
        drop(sink);

        let received = consumer.join().unwrap();
        assert_eq!(
            received.last(),
            Some(&IngestProgress::Finished { completed: 3 })
        );
    }

    #[test]
    fn test_store_failure_rolls_back_game_and_aborts_batch() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch("DROP TABLE games")
            .unwrap();
        let games = [record("Alice", 2200, "1"), record("Carol", 1900, "2")];
        let mut updates = Vec::new();

        let err = Loader::new(&mut store)
            .ingest_records(
                &games,
                &mut |p: IngestProgress| updates.push(p),
                &CancellationToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        let count = |table: &str| -> i64 {
            store
                .connection()
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap()
        };
        assert_eq!(count("events"), 0);
        assert_eq!(count("players"), 0);
        assert_eq!(store.player_elo("Carol").unwrap(), None);
        assert_eq!(updates, vec![IngestProgress::Started { total: 2 }]);
    }

    #[test]
    fn test_cancellation_inside_game_rolls_back_its_writes() {
        let mut store = Store::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Loader::new(&mut store)
            .store_one(&record("Alice", 2200, "1"), &cancel, 0)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { processed: 0 }));
        assert_eq!(store.counts().unwrap(), TableCounts::default());
    }

    #[test]
    fn test_cancellation_inside_game_without_transaction_keeps_event() {
        let mut store = Store::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Loader::new(&mut store)
            .transaction_per_game(false)
            .store_one(&record("Alice", 2200, "1"), &cancel, 0)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { processed: 0 }));
        let counts = store.counts().unwrap();
        assert_eq!(counts.events, 1);
        assert_eq!(counts.players, 0);
        assert_eq!(counts.games, 0);
    }

    #[test]
    fn test_cancellation_stops_batch() {
        let mut store = Store::open_in_memory().unwrap();
        let games = [
            record("Alice", 2200, "1"),
            record("Carol", 1900, "2"),
            record("Dave", 1800, "3"),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let err = Loader::new(&mut store)
            .ingest_records(
                &games,
                &mut |p: IngestProgress| {
                    if p == (IngestProgress::GameCompleted { completed: 1, total: 3 }) {
                        trigger.cancel();
                    }
                },
                &cancel,
            )
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { processed: 1 }));
        assert_eq!(store.counts().unwrap().games, 1);
        assert_eq!(store.player_elo("Carol").unwrap(), None);
    }

    #[test]
    fn test_rejected_games_are_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let text = ALICE_BOB.replacen(r#"[BlackElo "2100"]"#, r#"[BlackElo "?"]"#, 1);
        let path = write_pgn(dir.path(), "games.pgn", &text);
        let mut store = Store::open_in_memory().unwrap();

        let report = Loader::new(&mut store)
            .ingest_file(&path, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.games_parsed, 1);
        assert_eq!(report.games_processed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].block_index, 1);
        assert_eq!(store.counts().unwrap().games, 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut store = Store::open_in_memory().unwrap();
        let err = Loader::new(&mut store)
            .ingest_file(
                "/definitely/not/here.pgn",
                &mut NoProgress,
                &CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_ingest_glob_combines_files() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = ALICE_BOB
            .split_once("\n\n[Event")
            .map(|(a, b)| (a.to_string(), format!("[Event{b}")))
            .unwrap();
        write_pgn(dir.path(), "a.pgn", &first);
        let encoded = zstd::stream::encode_all(second.as_bytes(), 3).unwrap();
        std::fs::write(dir.path().join("b.pgn.zst"), encoded).unwrap();
        write_pgn(dir.path(), "c.pgn", "[Event \"Broken\"]\n\n1.e4 *\n");

        let mut store = Store::open_in_memory().unwrap();
        let pattern = format!("{}/*.pgn*", dir.path().display());
        let report = Loader::new(&mut store)
            .ingest_glob(&pattern, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.games_parsed, 2);
        assert_eq!(report.games_inserted, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].source, Some(dir.path().join("c.pgn")));
        assert_eq!(store.player_elo("Alice").unwrap(), Some(2350));
    }

    #[test]
    fn test_ingest_glob_single_unreadable_file_is_error() {
        let mut store = Store::open_in_memory().unwrap();
        let err = Loader::new(&mut store)
            .ingest_glob("/definitely/not/here.pgn", &mut NoProgress, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_ingest_glob_skips_unreadable_among_many() {
        let dir = tempfile::tempdir().unwrap();
        write_pgn(dir.path(), "a.pgn", ALICE_BOB);
        std::fs::create_dir(dir.path().join("b.pgn")).unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let pattern = format!("{}/*.pgn", dir.path().display());
        let report = Loader::new(&mut store)
            .ingest_glob(&pattern, &mut NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.files, vec![dir.path().join("a.pgn")]);
        assert_eq!(report.skipped_files, vec![dir.path().join("b.pgn")]);
        assert_eq!(report.games_inserted, 2);
    }
}
