//! schemact: declarative schema migrations.
//!
//! Migration files written in a small DSL are compiled to dialect-specific
//! DDL (PostgreSQL, MySQL/MariaDB, SQLite) and applied against a live
//! database one transaction per file, with every applied file journaled to a
//! hash-checked, file-locked ledger.
//!
//! ```text
//! source -> lexer -> tokens -> parser -> AST -> generator -> DDL list
//!        -> adapter executes the list in one transaction -> ledger records
//! ```

pub mod adapter;
pub mod ast;
pub mod codegen;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod ledger;
pub mod lexer;
pub mod lock;
pub mod parser;
pub mod validate;

pub use adapter::{infer_dialect_from_url, DbAdapter, SqlxAdapter};
pub use codegen::{generator_for, Dialect, MysqlGenerator, PostgresGenerator, SqliteGenerator, SqlGenerator};
pub use engine::{Engine, EngineOptions, MetricsSink, MIGRATION_EXTENSION};
pub use error::{Error, Result};
pub use ledger::{compute_hash, Ledger, LedgerEntry, LedgerState, DEFAULT_LEDGER_FILE};

/// Lex and parse one DSL compilation unit.
pub fn parse_schema(source: &str) -> Result<ast::Schema> {
    parser::parse(lexer::tokenize(source)?)
}
