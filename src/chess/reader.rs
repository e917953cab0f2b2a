use super::{
    error::{Error, ErrorAccumulator, Result},
    normalize::{parse_rating, parse_result, sanitize_event, select_event_date},
    types::{GameRecord, GameRecordParts},
    visitor::{ParsedBlock, TagMap, tokenize_block},
};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder as ZstdDecoder;

/// Tag groups a header must cover; `EventDate` and `Date` share a slot.
const RECOGNIZED_TAGS: [&[&str]; 9] = [
    &["Event"],
    &["Site"],
    &["EventDate", "Date"],
    &["Round"],
    &["White"],
    &["Black"],
    &["WhiteElo"],
    &["BlackElo"],
    &["Result"],
];

pub const MIN_RECOGNIZED_TAGS: usize = 7;

/// PGN marker for an unknown tag value.
const UNKNOWN_TAG_VALUE: &str = "?";

const EXCERPT_CHARS: usize = 60;

/// A game block excluded from the parse output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// 1-based position of the block in its file.
    pub block_index: usize,
    /// First line of the block, shortened, to locate it in the file.
    pub excerpt: String,
    pub reason: String,
    /// Set when the rejection came from a multi-file run.
    pub source: Option<PathBuf>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}: ", source.display())?;
        }
        write!(
            f,
            "game {} ({}): {}",
            self.block_index, self.excerpt, self.reason
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub games: Vec<GameRecord>,
    pub rejections: Vec<Rejection>,
}

/// Lines of one game: its tag section followed by any movetext paragraphs.
#[derive(Debug, Default)]
struct RawBlock<'a> {
    tag_lines: Vec<&'a str>,
    movetext_lines: Vec<&'a str>,
}

impl RawBlock<'_> {
    fn is_empty(&self) -> bool {
        self.tag_lines.is_empty() && self.movetext_lines.is_empty()
    }

    fn excerpt(&self) -> String {
        let first = self
            .tag_lines
            .first()
            .or_else(|| self.movetext_lines.first())
            .map(|line| line.trim())
            .unwrap_or_default();
        if first.chars().count() > EXCERPT_CHARS {
            let mut short: String = first.chars().take(EXCERPT_CHARS).collect();
            short.push_str("...");
            short
        } else {
            first.to_string()
        }
    }

    fn movetext(&self) -> String {
        self.movetext_lines.join("\n").trim().to_string()
    }

    fn source_text(&self) -> String {
        let mut text = self.tag_lines.join("\n");
        text.push_str("\n\n");
        text.push_str(&self.movetext_lines.join("\n"));
        text.push('\n');
        text
    }
}

/// A `[Name "value"]` tag pair line.
fn is_tag_line(trimmed: &str) -> bool {
    let Some(rest) = trimmed.strip_prefix('[') else {
        return false;
    };
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    name_len > 0 && rest[name_len..].trim_start().starts_with('"')
}

fn has_event_tag(lines: &[&str]) -> bool {
    lines
        .iter()
        .any(|line| line.trim_start().starts_with("[Event "))
}

/// Splits PGN text into game blocks.
///
/// Blank lines separate paragraphs. A paragraph starting with `[` opens a new
/// game; other paragraphs are movetext of the game opened before them. A tag
/// paragraph directly after another one continues the same header unless it
/// starts with an `Event` tag. A tag pair line inside movetext, or a second
/// `Event` tag inside a header, also opens a new game.
fn split_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let mut blocks = Vec::new();
    let mut current = RawBlock::default();
    let mut paragraph_start = true;
    let mut in_tags = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            paragraph_start = true;
            continue;
        }

        let trimmed = line.trim_start();
        let new_game = if paragraph_start {
            let opens_tags = trimmed.starts_with('[');
            let new_game = opens_tags && (!in_tags || trimmed.starts_with("[Event "));
            in_tags = opens_tags;
            paragraph_start = false;
            new_game
        } else if in_tags {
            if trimmed.starts_with('[') {
                trimmed.starts_with("[Event ") && has_event_tag(&current.tag_lines)
            } else {
                // movetext glued to the header without a blank line
                in_tags = false;
                false
            }
        } else if is_tag_line(trimmed) {
            // next header glued to the movetext without a blank line
            in_tags = true;
            true
        } else {
            false
        };

        if new_game && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        if in_tags {
            current.tag_lines.push(line);
        } else {
            current.movetext_lines.push(line);
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn recognized_tag_count(tags: &TagMap) -> usize {
    RECOGNIZED_TAGS
        .iter()
        .filter(|names| names.iter().any(|name| tags.get(name).is_some()))
        .count()
}

fn text_tag(tags: &TagMap, key: &str) -> String {
    tags.get(key).unwrap_or(UNKNOWN_TAG_VALUE).to_string()
}

/// Validates one tokenized block and builds its record.
fn build_record(parsed: ParsedBlock, movetext: String) -> Result<GameRecord, String> {
    let tags = &parsed.tags;

    let recognized = recognized_tag_count(tags);
    if recognized < MIN_RECOGNIZED_TAGS {
        return Err(format!(
            "only {recognized} of {} recognized tags present, at least {MIN_RECOGNIZED_TAGS} required",
            RECOGNIZED_TAGS.len()
        ));
    }

    let mut parse_error = ErrorAccumulator::default();
    let white_elo = parse_rating(tags.get("WhiteElo"), "WhiteElo", &mut parse_error);
    let black_elo = parse_rating(tags.get("BlackElo"), "BlackElo", &mut parse_error);
    let (Some(white_elo), Some(black_elo)) = (white_elo, black_elo) else {
        return Err(parse_error.take().unwrap_or_default());
    };

    let result = parse_result(tags.get("Result"));
    if let Some(marker) = parsed.movetext.outcome.as_deref()
        && marker != "*"
        && tags.get("Result").is_some_and(|tag| tag.trim() != marker)
    {
        log::warn!(
            "Result tag '{}' disagrees with movetext result '{marker}'; using the tag",
            tags.get("Result").unwrap_or_default()
        );
    }

    Ok(GameRecordParts {
        event: sanitize_event(&text_tag(tags, "Event")).into_owned(),
        site: text_tag(tags, "Site"),
        date: select_event_date(tags.get("EventDate"), tags.get("Date")),
        round: text_tag(tags, "Round"),
        white: text_tag(tags, "White"),
        black: text_tag(tags, "Black"),
        white_elo,
        black_elo,
        result,
        movetext,
    }
    .into())
}

/// Parses PGN text into game records.
///
/// Never fails: a malformed game is reported in `rejections` and the rest of
/// the text is still parsed.
pub fn parse_pgn(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for (idx, block) in split_blocks(text).into_iter().enumerate() {
        let block_index = idx + 1;
        let reject = |reason: String| Rejection {
            block_index,
            excerpt: block.excerpt(),
            reason,
            source: None,
        };

        if block.tag_lines.is_empty() {
            outcome
                .rejections
                .push(reject("movetext without a tag section".to_string()));
            continue;
        }

        let parsed = match tokenize_block(&block.source_text()) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                outcome
                    .rejections
                    .push(reject("no game found in block".to_string()));
                continue;
            }
            Err(e) => {
                outcome
                    .rejections
                    .push(reject(format!("unreadable block: {e}")));
                continue;
            }
        };

        match build_record(parsed, block.movetext()) {
            Ok(game) => outcome.games.push(game),
            Err(reason) => {
                let rejection = reject(reason);
                log::warn!("Skipping {rejection}");
                outcome.rejections.push(rejection);
            }
        }
    }

    log::debug!(
        "Parsed {} games, rejected {}",
        outcome.games.len(),
        outcome.rejections.len()
    );
    outcome
}

/// How PGN file bytes are stored on disk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    /// zstd for `.zst` files, plain otherwise.
    #[default]
    Auto,
    Plain,
    Zstd,
}

impl Compression {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim();
        if normalized.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else if normalized.eq_ignore_ascii_case("plain") || normalized.eq_ignore_ascii_case("none")
        {
            Ok(Self::Plain)
        } else if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else {
            Err(format!(
                "Invalid compression value '{normalized}'. Supported values: 'auto', 'plain' or 'zstd'."
            ))
        }
    }

    fn resolve(self, path: &Path) -> Self {
        match self {
            Self::Auto => {
                let is_zstd = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zst"));
                if is_zstd { Self::Zstd } else { Self::Plain }
            }
            other => other,
        }
    }
}

/// Reads a whole PGN file, decompressing if needed. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn read_pgn_file(path: &Path, compression: Compression) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut bytes = Vec::new();
    match compression.resolve(path) {
        Compression::Zstd => {
            let mut decoder = ZstdDecoder::new(file).map_err(|e| Error::io(path, e))?;
            decoder
                .read_to_end(&mut bytes)
                .map_err(|e| Error::io(path, e))?;
        }
        _ => {
            let mut file = file;
            file.read_to_end(&mut bytes)
                .map_err(|e| Error::io(path, e))?;
        }
    }

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Expands a glob pattern (`*` or `?`) into matching paths; a plain path is
/// returned as is.
pub fn expand_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    if pattern.contains('*') || pattern.contains('?') {
        let mut paths: Vec<PathBuf> = glob::glob(pattern)?
            .filter_map(|entry| entry.ok())
            .collect();
        paths.sort();
        Ok(paths)
    } else {
        Ok(vec![PathBuf::from(pattern)])
    }
}
