//! Recursive-descent parser: token stream in, [`Schema`] out.
//!
//! ```text
//! schema         := (model | raw_sql)*
//! model          := "model" IDENT "{" column+ "}"
//! column         := IDENT TYPE type_args? decorator*
//! type_args      := "(" arg ("," arg)* ")"      -- parentheses may be empty
//! decorator      := "@" NAME decorator_args?
//! decorator_args := "(" arg ("," arg)* ")"
//! arg            := STRING | NUMBER | IDENT ("." IDENT)?
//! ```
//!
//! The parser enforces structure only; whether a decorator or default makes
//! sense for a given dialect is the generator's concern.

use crate::ast::{Column, Decorator, Model, RawSql, Schema};
use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};

/// Parse a full token stream, as produced by [`crate::lexer::tokenize`].
pub fn parse(tokens: Vec<Token>) -> Result<Schema> {
    Parser { tokens, pos: 0 }.schema()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.bump())
        } else {
            Err(Error::parse(
                format!(
                    "expected {}, found {} '{}'",
                    kind.describe(),
                    token.kind.describe(),
                    token.value
                ),
                token.line,
                token.column,
            ))
        }
    }

    fn schema(&mut self) -> Result<Schema> {
        let mut schema = Schema::default();
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Model => schema.models.push(self.model()?),
                TokenKind::RawSql => {
                    let token = self.bump();
                    schema.raw_sql.push(RawSql {
                        sql: token.value,
                        line: token.line,
                    });
                }
                kind => {
                    return Err(Error::parse(
                        format!("unexpected token {} '{}'", kind.describe(), token.value),
                        token.line,
                        token.column,
                    ));
                }
            }
        }
        Ok(schema)
    }

    fn model(&mut self) -> Result<Model> {
        self.expect(TokenKind::Model)?;
        let name = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::LBrace)?;

        let mut columns = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            columns.push(self.column()?);
        }
        self.expect(TokenKind::RBrace)?;

        if columns.is_empty() {
            return Err(Error::parse(
                format!("model '{}' must have at least one column", name.value),
                name.line,
                name.column,
            ));
        }
        Ok(Model {
            name: name.value,
            columns,
            line: name.line,
            column: name.column,
        })
    }

    fn column(&mut self) -> Result<Column> {
        let name = self.expect(TokenKind::Ident)?;
        let type_name = self.expect(TokenKind::Type)?;
        let type_args = if self.peek().kind == TokenKind::LParen {
            Some(self.arg_list()?)
        } else {
            None
        };

        let mut decorators: Vec<Decorator> = Vec::new();
        while self.peek().kind == TokenKind::Decorator {
            let token = self.bump();
            if decorators.iter().any(|d| d.name == token.value) {
                return Err(Error::parse(
                    format!("duplicate decorator '@{}'", token.value),
                    token.line,
                    token.column,
                ));
            }
            let args = if self.peek().kind == TokenKind::LParen {
                Some(self.arg_list()?)
            } else {
                None
            };
            decorators.push(Decorator {
                name: token.value,
                args,
                line: token.line,
                column: token.column,
            });
        }

        Ok(Column {
            name: name.value,
            type_name: type_name.value,
            type_args,
            decorators,
        })
    }

    /// A parenthesized, comma-separated argument list. `()` yields an empty
    /// list, which downstream treats as "no arguments supplied".
    fn arg_list(&mut self) -> Result<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            match self.peek().kind {
                TokenKind::Comma => {
                    self.bump();
                }
                TokenKind::RParen => {
                    self.bump();
                    break;
                }
                kind => {
                    let token = self.peek();
                    return Err(Error::parse(
                        format!(
                            "expected ',' or ')', found {} '{}'",
                            kind.describe(),
                            token.value
                        ),
                        token.line,
                        token.column,
                    ));
                }
            }
        }
        Ok(args)
    }

    /// `STRING | NUMBER | bareword ("." bareword)?`. Type names and the
    /// `model` keyword are accepted as barewords so enum variants like
    /// `Enum(Text, Json)` stay legal.
    fn arg(&mut self) -> Result<String> {
        let token = self.peek();
        match token.kind {
            TokenKind::Str | TokenKind::Number => Ok(self.bump().value),
            TokenKind::Ident | TokenKind::Type | TokenKind::Model => {
                let first = self.bump().value;
                if self.peek().kind == TokenKind::Dot {
                    self.bump();
                    let second = self.bareword()?;
                    Ok(format!("{}.{}", first, second))
                } else {
                    Ok(first)
                }
            }
            kind => Err(Error::parse(
                format!(
                    "expected argument, found {} '{}'",
                    kind.describe(),
                    token.value
                ),
                token.line,
                token.column,
            )),
        }
    }

    fn bareword(&mut self) -> Result<String> {
        let token = self.peek();
        match token.kind {
            TokenKind::Ident | TokenKind::Type | TokenKind::Model => Ok(self.bump().value),
            kind => Err(Error::parse(
                format!(
                    "expected identifier, found {} '{}'",
                    kind.describe(),
                    token.value
                ),
                token.line,
                token.column,
            )),
        }
    }
}
