use super::error::ErrorAccumulator;
use super::types::{EventDate, GameResult};
use chrono::NaiveDate;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

// Anything that is not a letter, number, punctuation mark or separator.
static NON_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{N}\p{P}\p{Z}]").expect("valid non-text character regex")
});

/// Strips control characters, symbols and encoding debris from an Event name.
pub fn sanitize_event(raw: &str) -> Cow<'_, str> {
    NON_TEXT_RE.replace_all(raw, "")
}

/// Parses a PGN date in strict `YYYY.MM.DD` form.
///
/// Unknown components (`??`), other separators, short fields and impossible
/// calendar days all yield `None`.
pub fn parse_pgn_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.trim().as_bytes();
    if bytes.len() != 10 || bytes[4] != b'.' || bytes[7] != b'.' {
        return None;
    }

    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        let part = &bytes[range];
        if !part.iter().all(u8::is_ascii_digit) {
            return None;
        }
        part.iter()
            .try_fold(0u32, |acc, b| acc.checked_mul(10)?.checked_add(u32::from(b - b'0')))
    };

    let year = digits(0..4)?;
    let month = digits(5..7)?;
    let day = digits(8..10)?;

    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

/// Picks the event date: `EventDate` first, then `Date`.
///
/// A candidate that does not parse strictly is skipped, so a game with
/// `[EventDate "????.??.??"]` and a complete `[Date]` still gets a date.
pub fn select_event_date(event_date: Option<&str>, date: Option<&str>) -> EventDate {
    [event_date, date]
        .into_iter()
        .flatten()
        .find_map(parse_pgn_date)
        .map(EventDate::Known)
        .unwrap_or(EventDate::Unknown)
}

pub fn parse_result(raw: Option<&str>) -> GameResult {
    raw.map(GameResult::from_pgn).unwrap_or(GameResult::Draw)
}

/// Parses a required rating tag, recording why it failed.
pub fn parse_rating(
    raw: Option<&str>,
    label: &str,
    parse_error: &mut ErrorAccumulator,
) -> Option<i32> {
    let Some(raw) = raw else {
        parse_error.push(format!("{label} missing"));
        return None;
    };

    let s = raw.trim();
    match s.parse::<i32>() {
        Ok(v) => Some(v),
        Err(_) => {
            parse_error.push(format!("{label}='{s}' is not an integer"));
            None
        }
    }
}
