//! Hand-written scanner for the migration DSL.
//!
//! Single pass, character by character, with one token of lookahead consumed
//! by the parser. Every token records the 1-based line and starting column of
//! its lexeme so errors point at the offending source.

use crate::error::{Error, Result};

/// The closed set of recognized column types. Matching is case-sensitive.
pub const TYPE_NAMES: &[&str] = &[
    "Serial",
    "Int",
    "BigInt",
    "SmallInt",
    "VarChar",
    "Char",
    "Text",
    "Boolean",
    "Timestamp",
    "Date",
    "Time",
    "Decimal",
    "Numeric",
    "Real",
    "DoublePrecision",
    "Json",
    "Jsonb",
    "Uuid",
    "Enum",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The `model` keyword, matched case-insensitively.
    Model,
    Ident,
    /// A name from [`TYPE_NAMES`].
    Type,
    /// A decorator name, without the leading `@`.
    Decorator,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Str,
    Number,
    /// The trimmed remainder of a line that began with `>`.
    RawSql,
    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Model => "keyword 'model'",
            TokenKind::Ident => "identifier",
            TokenKind::Type => "type",
            TokenKind::Decorator => "decorator",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::RawSql => "raw SQL",
            TokenKind::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

/// Tokenize an entire source text. The returned stream always ends with a
/// single [`TokenKind::Eof`] token.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Whether the current line has produced a token yet. `>` introduces raw
    /// SQL only while this is false.
    line_has_content: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            line_has_content: false,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            value: String::new(),
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_has_content = false;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        let ch = loop {
            let Some(ch) = self.peek() else {
                return Ok(None);
            };
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break ch,
            }
        };

        let line = self.line;
        let column = self.column;

        let token = match ch {
            '(' => self.single(TokenKind::LParen, ch),
            ')' => self.single(TokenKind::RParen, ch),
            '{' => self.single(TokenKind::LBrace, ch),
            '}' => self.single(TokenKind::RBrace, ch),
            ',' => self.single(TokenKind::Comma, ch),
            '.' => self.single(TokenKind::Dot, ch),
            '>' => {
                if self.line_has_content {
                    return Err(Error::parse(
                        format!("unexpected character '{}'", ch),
                        line,
                        column,
                    ));
                }
                self.raw_sql_line()
            }
            '@' => self.decorator(line, column)?,
            '\'' | '"' => self.string_literal(ch, line, column)?,
            '0'..='9' => self.number(),
            'A'..='Z' | 'a'..='z' | '_' => self.word(),
            _ => {
                return Err(Error::parse(
                    format!("unexpected character '{}'", ch),
                    line,
                    column,
                ));
            }
        };
        self.line_has_content = true;
        Ok(Some(Token {
            line,
            column,
            ..token
        }))
    }

    fn single(&mut self, kind: TokenKind, ch: char) -> Token {
        self.advance();
        self.token(kind, ch.to_string())
    }

    fn token(&self, kind: TokenKind, value: String) -> Token {
        Token {
            kind,
            value,
            line: self.line,
            column: self.column,
        }
    }

    /// Consume from the `>` marker to end of line; the token value is the
    /// trimmed remainder of the line.
    fn raw_sql_line(&mut self) -> Token {
        self.advance(); // '>'
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        self.token(TokenKind::RawSql, text.trim().to_string())
    }

    fn decorator(&mut self, line: usize, column: usize) -> Result<Token> {
        self.advance(); // '@'
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(Error::parse("expected decorator name", line, column));
        }
        Ok(self.token(TokenKind::Decorator, name))
    }

    fn string_literal(&mut self, quote: char, line: usize, column: usize) -> Result<Token> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(Error::parse("unterminated string", line, column));
            };
            if c == quote {
                break;
            }
            if c == '\\' {
                let Some(escaped) = self.advance() else {
                    return Err(Error::parse("unterminated string", line, column));
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    c if c == quote => value.push(c),
                    other => value.push(other),
                }
            } else {
                value.push(c);
            }
        }
        Ok(self.token(TokenKind::Str, value))
    }

    /// `[0-9]+(\.[0-9]+)?`. The dot is consumed only when a digit follows it,
    /// so `Decimal(10,2)` and a trailing `1.` both lex sensibly.
    fn number(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.token(TokenKind::Number, text)
    }

    fn word(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = if text.eq_ignore_ascii_case("model") {
            TokenKind::Model
        } else if TYPE_NAMES.contains(&text.as_str()) {
            TokenKind::Type
        } else {
            TokenKind::Ident
        };
        self.token(kind, text)
    }
}
