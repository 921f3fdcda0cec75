//! DDL generation: one generator per database dialect, all behind
//! [`SqlGenerator`].
//!
//! Every returned statement is self-contained and executed in list order
//! inside a single transaction. UP emits `CREATE TABLE` statements in source
//! order followed by raw SQL lines in source order; DOWN emits
//! `DROP TABLE IF EXISTS` in reverse model order. Raw SQL is passed through
//! verbatim and only on the UP side; the DSL has no way to express an inverse
//! for arbitrary SQL, so DOWN never re-emits it.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlGenerator;
pub use postgres::PostgresGenerator;
pub use sqlite::SqliteGenerator;

use crate::ast::{Column, Model};
use crate::error::{Error, Result};
use crate::validate::validate_identifier;

/// Target database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    /// Maximum identifier length the dialect accepts.
    pub fn identifier_cap(self) -> usize {
        match self {
            Dialect::Postgres => 63,
            Dialect::Mysql => 64,
            Dialect::Sqlite => 256,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(Error::Validation(format!("unknown database '{}'", other))),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The contract shared by all three generators.
pub trait SqlGenerator: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Statements that apply the schema, in execution order.
    fn generate_up(&self, schema: &crate::ast::Schema) -> Result<Vec<String>>;

    /// Statements that reverse the schema, dropping tables in reverse model
    /// order.
    fn generate_down(&self, schema: &crate::ast::Schema) -> Result<Vec<String>>;
}

/// Construct the generator for a dialect with its default options.
pub fn generator_for(dialect: Dialect) -> Box<dyn SqlGenerator> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresGenerator),
        Dialect::Mysql => Box::new(MysqlGenerator::default()),
        Dialect::Sqlite => Box::new(SqliteGenerator),
    }
}

/// Decorator names the generators understand.
const KNOWN_DECORATORS: &[&str] = &["pk", "unique", "notnull", "default", "ref", "onDelete"];

/// Allowed `ON DELETE` referential actions, canonical spelling.
const ON_DELETE_ACTIONS: &[&str] = &["CASCADE", "SET NULL", "SET DEFAULT", "RESTRICT", "NO ACTION"];

/// Validate and quote an identifier for the dialect. Hostile names are
/// rejected, never escaped.
pub(crate) fn quote_ident(dialect: Dialect, name: &str) -> Result<String> {
    validate_identifier(name, dialect.identifier_cap())?;
    Ok(match dialect {
        Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name),
        Dialect::Mysql => format!("`{}`", name),
    })
}

/// A SQL string literal with single quotes doubled.
pub(crate) fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_numeric_lexeme(value: &str) -> bool {
    let mut dots = 0;
    !value.is_empty()
        && value.chars().all(|c| {
            if c == '.' {
                dots += 1;
                dots == 1
            } else {
                c.is_ascii_digit()
            }
        })
}

/// Format a `@default(v)` argument for the dialect: `now` becomes
/// `CURRENT_TIMESTAMP`, booleans become the native literal (`1`/`0` outside
/// PostgreSQL), numeric lexemes pass through, anything else is a string
/// literal.
pub(crate) fn format_default(dialect: Dialect, raw: &str) -> String {
    if raw.eq_ignore_ascii_case("now") {
        return "CURRENT_TIMESTAMP".to_string();
    }
    if raw.eq_ignore_ascii_case("true") {
        return match dialect {
            Dialect::Postgres => "TRUE".to_string(),
            _ => "1".to_string(),
        };
    }
    if raw.eq_ignore_ascii_case("false") {
        return match dialect {
            Dialect::Postgres => "FALSE".to_string(),
            _ => "0".to_string(),
        };
    }
    if is_numeric_lexeme(raw) {
        return raw.to_string();
    }
    sql_string(raw)
}

/// Canonicalize an `@onDelete` action, rejecting anything outside the allowed
/// set.
pub(crate) fn on_delete_action(raw: &str) -> Result<&'static str> {
    let wanted = raw.to_ascii_uppercase();
    ON_DELETE_ACTIONS
        .iter()
        .find(|a| **a == wanted)
        .copied()
        .ok_or_else(|| {
            Error::Generator(format!(
                "invalid ON DELETE action '{}'; allowed: {}",
                raw,
                ON_DELETE_ACTIONS.join(", ")
            ))
        })
}

/// Split a `@ref(Table.column)` argument into table and column.
pub(crate) fn ref_target(column: &Column) -> Result<(String, String)> {
    let arg = column
        .decorator("ref")
        .and_then(|d| d.single_arg())
        .ok_or_else(|| {
            Error::Generator(format!(
                "@ref on column '{}' requires exactly one Table.column argument",
                column.name
            ))
        })?;
    match arg.split_once('.') {
        Some((table, col)) if !table.is_empty() && !col.is_empty() => {
            Ok((table.to_string(), col.to_string()))
        }
        _ => Err(Error::Generator(format!(
            "@ref on column '{}' requires a dotted Table.column argument, got '{}'",
            column.name, arg
        ))),
    }
}

/// Structural decorator checks shared by every dialect: unknown names, arity,
/// and `@onDelete` pairing. The parser has already rejected duplicates.
pub(crate) fn check_decorators(model: &Model, column: &Column) -> Result<()> {
    for dec in &column.decorators {
        if !KNOWN_DECORATORS.contains(&dec.name.as_str()) {
            return Err(Error::Generator(format!(
                "unknown decorator '@{}' on {}.{}",
                dec.name, model.name, column.name
            )));
        }
        match dec.name.as_str() {
            "pk" | "unique" | "notnull" => {
                if dec.args.as_deref().is_some_and(|a| !a.is_empty()) {
                    return Err(Error::Generator(format!(
                        "@{} on {}.{} takes no arguments",
                        dec.name, model.name, column.name
                    )));
                }
            }
            "default" => {
                if dec.single_arg().is_none() {
                    return Err(Error::Generator(format!(
                        "@default on {}.{} requires exactly one value",
                        model.name, column.name
                    )));
                }
            }
            "ref" | "onDelete" => {
                if dec.single_arg().is_none() {
                    return Err(Error::Generator(format!(
                        "@{} on {}.{} requires exactly one argument",
                        dec.name, model.name, column.name
                    )));
                }
            }
            _ => unreachable!(),
        }
    }
    if column.has_decorator("onDelete") && !column.has_decorator("ref") {
        return Err(Error::Generator(format!(
            "@onDelete on {}.{} requires @ref on the same column",
            model.name, column.name
        )));
    }
    Ok(())
}

/// Table-level `FOREIGN KEY` clause for a column carrying `@ref`, with the
/// optional `ON DELETE` action appended.
pub(crate) fn foreign_key_clause(dialect: Dialect, column: &Column) -> Result<String> {
    let (table, target_col) = ref_target(column)?;
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {}({})",
        quote_ident(dialect, &column.name)?,
        quote_ident(dialect, &table)?,
        quote_ident(dialect, &target_col)?,
    );
    if let Some(dec) = column.decorator("onDelete") {
        if let Some(raw) = dec.single_arg() {
            let action = on_delete_action(raw)?;
            clause.push_str(" ON DELETE ");
            clause.push_str(action);
        }
    }
    Ok(clause)
}

/// First type argument as a length, or the default when no arguments were
/// supplied (an empty argument list counts as none).
pub(crate) fn length_arg(column: &Column, default: u32) -> Result<u32> {
    match column.type_args.as_deref() {
        None | Some([]) => Ok(default),
        Some([first, ..]) => first.parse::<u32>().map_err(|_| {
            Error::Generator(format!(
                "{} length on column '{}' must be numeric, got '{}'",
                column.type_name, column.name, first
            ))
        }),
    }
}

/// Precision and scale for `Decimal`/`Numeric`, defaulting each missing
/// position to `(10, 2)`.
pub(crate) fn precision_args(column: &Column) -> Result<(u32, u32)> {
    let args = column.type_args.as_deref().unwrap_or(&[]);
    let parse = |value: &str| {
        value.parse::<u32>().map_err(|_| {
            Error::Generator(format!(
                "{} precision on column '{}' must be numeric, got '{}'",
                column.type_name, column.name, value
            ))
        })
    };
    let precision = match args.first() {
        Some(v) => parse(v)?,
        None => 10,
    };
    let scale = match args.get(1) {
        Some(v) => parse(v)?,
        None => 2,
    };
    Ok((precision, scale))
}

/// Enum variant list, each rendered as a SQL string literal.
pub(crate) fn enum_variants(column: &Column) -> Result<Vec<String>> {
    match column.type_args.as_deref() {
        Some(args) if !args.is_empty() => Ok(args.iter().map(|v| sql_string(v)).collect()),
        _ => Err(Error::Generator(format!(
            "Enum column '{}' requires at least one variant",
            column.name
        ))),
    }
}
