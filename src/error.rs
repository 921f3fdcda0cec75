use thiserror::Error;

/// Every failure the crate can surface, tagged by kind so callers can
/// pattern-match instead of string-sniffing.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Lexer or parser failure. Locations are 1-based.
    #[error("{message} (line {line}, column {column})")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    /// Semantic misuse detected while generating DDL, e.g. an unknown
    /// decorator or an `ON DELETE` action outside the allowed set.
    #[error("{0}")]
    Generator(String),

    /// An applied migration is missing or modified, the ledger file is
    /// corrupted, or the ledger lock could not be obtained.
    #[error("{0}")]
    Integrity(String),

    /// Rejected identifier, migration name, path, or file size.
    #[error("{0}")]
    Validation(String),

    /// The database is unreachable or a transaction failed.
    #[error("database error: {0}")]
    Adapter(String),

    /// Migrations were committed to the database but the ledger could not be
    /// brought up to date. The two must be reconciled by hand before any
    /// further migration runs.
    #[error("CRITICAL: {0}. The database and the ledger disagree; reconcile the ledger manually before running schemact again.")]
    CriticalInconsistency(String),
}

impl Error {
    pub fn parse(message: impl Into<String>, line: usize, column: usize) -> Self {
        Error::Parse {
            message: message.into(),
            line,
            column,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
