pub mod expression;
pub mod function;
pub mod statement;
pub mod struct_;


use tracing::debug;

use std::mem;

use crate::ast::Program;
use crate::errors::{HelixError, HelixResult};
use crate::lexer::{Lexeme, Token};
use crate::span::Span;

/// Recursive-descent parser over a token vector. Fails on the first error.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Lexeme>,
    position: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Lexeme>) -> Self {
        if tokens.last().map(|lexeme| &lexeme.token) != Some(&Token::Eof) {
            let end = tokens.last().map(|lexeme| lexeme.span).unwrap_or_default();
            tokens.push(Lexeme {
                token: Token::Eof,
                span: Span::new(end.end, end.end, end.line, end.column),
            });
        }
        Parser {
            tokens,
            position: 0,
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse_program(&mut self) -> HelixResult<Program> {
        let mut statements = vec![];
        while !self.at_end() {
            statements.push(self.parse_statement()?);
        }
        debug!(statements = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn current(&self) -> &Lexeme {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.current().token
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.position + n).min(last)].token
    }

    pub(crate) fn peek_span(&self) -> Span {
        self.current().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    pub(crate) fn advance(&mut self) -> Lexeme {
        let lexeme = self.current().clone();
        if !self.at_end() {
            self.position += 1;
        }
        lexeme
    }

    /// True when the next token is the same kind as `token`, ignoring payloads.
    pub(crate) fn check(&self, token: &Token) -> bool {
        mem::discriminant(self.peek()) == mem::discriminant(token)
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: Token, context: &str) -> HelixResult<Lexeme> {
        if self.check(&token) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{token} {context}")))
        }
    }

    pub(crate) fn expect_identifier(&mut self, context: &str) -> HelixResult<(String, Span)> {
        let lexeme = self.current().clone();
        match lexeme.token {
            Token::Identifier(name) => {
                self.advance();
                Ok((name, lexeme.span))
            }
            _ => Err(self.unexpected(&format!("an identifier {context}"))),
        }
    }

    /// Builds "expected X, found Y" at the current token.
    pub(crate) fn unexpected(&self, expectation: &str) -> HelixError {
        HelixError::syntax(
            format!("expected {expectation}, found {}", self.peek()),
            self.peek_span(),
        )
    }
}

/// Parses a complete token stream into a program.
pub fn parse(tokens: Vec<Lexeme>) -> HelixResult<Program> {
    Parser::new(tokens).parse_program()
}
