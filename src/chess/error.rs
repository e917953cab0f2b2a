use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an ingestion run or a query.
///
/// Rejected game blocks are not errors; they are reported per game in
/// [`super::reader::Rejection`].
#[derive(Debug, Error)]
pub enum Error {
    /// Any failure from the store (connect, upsert, insert, query).
    #[error("store failure: {0}")]
    Store(#[from] duckdb::Error),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("invalid setting {name}: {message}")]
    Config { name: &'static str, message: String },

    #[error("ingestion cancelled after {processed} games")]
    Cancelled { processed: usize },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(name: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            name,
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Collects the reasons one game block was rejected.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    /// Appends one rejection reason.
    pub fn push(&mut self, reason: impl AsRef<str>) {
        let reason = reason.as_ref();
        match &mut self.0 {
            Some(joined) => {
                joined.push_str("; ");
                joined.push_str(reason);
            }
            None => self.0 = Some(reason.to_owned()),
        }
    }

    /// Returns the joined reasons, leaving the accumulator empty.
    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}
