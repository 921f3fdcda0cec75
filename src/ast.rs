//! The schema AST produced by the parser and consumed by the generators.

/// A parsed migration file: models and raw SQL lines, each in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub models: Vec<Model>,
    pub raw_sql: Vec<RawSql>,
}

impl Schema {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.raw_sql.is_empty()
    }
}

/// A `model Name { ... }` block. Always has at least one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub columns: Vec<Column>,
    /// Location of the model name, for error reporting.
    pub line: usize,
    pub column: usize,
}

/// One column definition inside a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// One of the recognized type names; the lexer already vetted membership.
    pub type_name: String,
    /// `None` when no parentheses were written; `Some(vec![])` for `Type()`.
    pub type_args: Option<Vec<String>>,
    pub decorators: Vec<Decorator>,
}

impl Column {
    /// Find a decorator by name. Decorator names are unique per column; the
    /// parser rejects duplicates.
    pub fn decorator(&self, name: &str) -> Option<&Decorator> {
        self.decorators.iter().find(|d| d.name == name)
    }

    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorator(name).is_some()
    }
}

/// A `@name` or `@name(args)` attachment on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: String,
    /// `None` when no parentheses were written; `Some(vec![])` for `@name()`.
    pub args: Option<Vec<String>>,
    pub line: usize,
    pub column: usize,
}

impl Decorator {
    /// The single argument, when exactly one was supplied.
    pub fn single_arg(&self) -> Option<&str> {
        match self.args.as_deref() {
            Some([arg]) => Some(arg.as_str()),
            _ => None,
        }
    }
}

/// A `> ...` line passed through to the UP output verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub line: usize,
}
