use super::error::Result;
use super::store::Store;
use super::types::EventDate;
use chrono::NaiveDate;
use duckdb::params_from_iter;
use duckdb::types::Value;
use std::fmt::Write;

const BASE_SELECT: &str = "SELECT e.name, e.site, CAST(e.date AS VARCHAR), g.round, g.result, \
     w.name, w.elo, b.name, b.elo";

const FROM_JOINS: &str = " FROM games g \
     JOIN events e ON g.event_id = e.event_id \
     JOIN players w ON g.white_player_id = w.player_id \
     JOIN players b ON g.black_player_id = b.player_id \
     WHERE 1 = 1";

/// Inclusive range of event dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Optional criteria for [`Store::query_games`]. `None` or an empty string
/// leaves a field unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameFilter {
    pub white: Option<String>,
    pub black: Option<String>,
    /// Movetext prefix, e.g. `1.e4`.
    pub opening: Option<String>,
    /// Result code: `W`, `B` or `D`.
    pub winner: Option<String>,
    pub dates: Option<DateRange>,
    pub show_moves: bool,
}

impl GameFilter {
    pub fn white(mut self, name: impl Into<String>) -> Self {
        self.white = Some(name.into());
        self
    }

    pub fn black(mut self, name: impl Into<String>) -> Self {
        self.black = Some(name.into());
        self
    }

    pub fn opening(mut self, prefix: impl Into<String>) -> Self {
        self.opening = Some(prefix.into());
        self
    }

    pub fn winner(mut self, code: impl Into<String>) -> Self {
        self.winner = Some(code.into());
        self
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.dates = Some(DateRange { start, end });
        self
    }

    pub fn show_moves(mut self, show: bool) -> Self {
        self.show_moves = show;
        self
    }
}

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Builds the retrieval statement for `filter`. Filter values only ever
/// appear as bound parameters.
pub fn build_query(filter: &GameFilter) -> BuiltQuery {
    let mut sql = String::from(BASE_SELECT);
    if filter.show_moves {
        sql.push_str(", g.moves");
    }
    sql.push_str(FROM_JOINS);

    let mut params = Vec::new();
    if let Some(white) = present(&filter.white) {
        sql.push_str(" AND w.name = ?");
        params.push(Value::Text(white.to_string()));
    }
    if let Some(black) = present(&filter.black) {
        sql.push_str(" AND b.name = ?");
        params.push(Value::Text(black.to_string()));
    }
    if let Some(opening) = present(&filter.opening) {
        sql.push_str(" AND starts_with(g.moves, ?)");
        params.push(Value::Text(opening.to_string()));
    }
    if let Some(winner) = present(&filter.winner) {
        sql.push_str(" AND g.result = ?");
        params.push(Value::Text(winner.to_string()));
    }
    if let Some(range) = filter.dates {
        sql.push_str(" AND e.date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)");
        params.push(Value::Text(EventDate::Known(range.start).to_store_value()));
        params.push(Value::Text(EventDate::Known(range.end).to_store_value()));
    }

    sql.push_str(" ORDER BY g.game_id");
    BuiltQuery { sql, params }
}

/// One joined result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub event: String,
    pub site: String,
    pub date: EventDate,
    pub round: String,
    pub result: String,
    pub white: String,
    pub white_elo: i32,
    pub black: String,
    pub black_elo: i32,
    pub moves: Option<String>,
}

impl GameRow {
    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "Event: {}", self.event);
        let _ = writeln!(out, "Site: {}", self.site);
        let _ = writeln!(out, "Date: {}", self.date);
        let _ = writeln!(out, "Round: {}", self.round);
        let _ = writeln!(out, "White: {} ({})", self.white, self.white_elo);
        let _ = writeln!(out, "Black: {} ({})", self.black, self.black_elo);
        let _ = writeln!(out, "Result: {}", self.result);
        if let Some(moves) = &self.moves {
            let _ = writeln!(out, "Moves: {moves}");
        }
        out.push('\n');
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReport {
    pub row_count: usize,
    pub text: String,
}

impl QueryReport {
    /// Text with a leading `"<n> results"` line.
    pub fn summary(&self) -> String {
        format!("{} results\n{}", self.row_count, self.text)
    }
}

impl Store {
    pub fn query_rows(&self, filter: &GameFilter) -> Result<Vec<GameRow>> {
        let query = build_query(filter);
        log::debug!("Running query: {}", query.sql);

        let mut stmt = self.connection().prepare(&query.sql)?;
        let rows = stmt.query_map(params_from_iter(query.params), |row| {
            let date: String = row.get(2)?;
            Ok(GameRow {
                event: row.get(0)?,
                site: row.get(1)?,
                date: EventDate::from_store_value(&date),
                round: row.get(3)?,
                result: row.get(4)?,
                white: row.get(5)?,
                white_elo: row.get(6)?,
                black: row.get(7)?,
                black_elo: row.get(8)?,
                moves: if filter.show_moves {
                    Some(row.get(9)?)
                } else {
                    None
                },
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Runs a filtered query and renders each game as a text block.
    pub fn query_games(&self, filter: &GameFilter) -> Result<QueryReport> {
        let rows = self.query_rows(filter)?;
        let mut text = String::new();
        for row in &rows {
            row.render(&mut text);
        }
        Ok(QueryReport {
            row_count: rows.len(),
            text,
        })
    }
}
