use logos::{FilterResult, Logos};
use tracing::debug;

use std::fmt;

use crate::errors::{HelixError, HelixResult};
use crate::span::{LineIndex, Span};

#[cfg(test)]
pub mod test;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedComment,
    MalformedNumber,
}

pub(crate) fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            // `\"`, `\'`, `\\` and unknown escapes all yield the escaped char
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn string_literal(lex: &mut logos::Lexer<Token>) -> Result<String, LexError> {
    let s = lex.slice();
    Ok(unescape(&s[1..s.len() - 1]))
}

fn unterminated_string(_lex: &mut logos::Lexer<Token>) -> Result<String, LexError> {
    Err(LexError::UnterminatedString)
}

fn integer(lex: &mut logos::Lexer<Token>) -> Result<i64, LexError> {
    lex.slice()
        .parse::<i64>()
        .map_err(|_| LexError::MalformedNumber)
}

fn float(lex: &mut logos::Lexer<Token>) -> Result<f64, LexError> {
    let s = lex.slice();
    if s.matches('.').count() > 1 {
        return Err(LexError::MalformedNumber);
    }
    s.parse::<f64>().map_err(|_| LexError::MalformedNumber)
}

fn block_comment(lex: &mut logos::Lexer<Token>) -> FilterResult<(), LexError> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(lex.remainder().len());
            FilterResult::Error(LexError::UnterminatedComment)
        }
    }
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexError)]
#[logos(skip r"[ \n\r\t\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[regex(r"[0-9]+", integer)]
    Int(i64),

    // a second `.` is matched here too so it can be rejected as one lexeme
    #[regex(r"[0-9]+\.[0-9]*(\.[0-9]*)*", float)]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, string_literal)]
    #[regex(r#""([^"\\]|\\.)*"#, unterminated_string)]
    #[regex(r#"'([^'\\]|\\.)*'"#, string_literal)]
    #[regex(r#"'([^'\\]|\\.)*"#, unterminated_string)]
    String(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("/*", block_comment)]
    BlockComment,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Mul,

    #[token("/")]
    Div,

    #[token("%")]
    Mod,

    #[token("==")]
    Eq,

    #[token("!=")]
    NotEq,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token("<=")]
    LessEq,

    #[token(">=")]
    GreaterEq,

    #[token("and")]
    #[token("&&")]
    And,

    #[token("or")]
    #[token("||")]
    Or,

    #[token("not")]
    #[token("!")]
    Not,

    #[token("=")]
    Assign,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("->")]
    Arrow,

    #[token("let")]
    KeywordLet,

    #[token("var")]
    KeywordVar,

    #[token("fn")]
    KeywordFn,

    #[token("if")]
    KeywordIf,

    #[token("else")]
    KeywordElse,

    #[token("while")]
    KeywordWhile,

    #[token("for")]
    KeywordFor,

    #[token("return")]
    KeywordReturn,

    #[token("struct")]
    KeywordStruct,

    #[token("import")]
    KeywordImport,

    // appended by `tokenize`, never matched
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Bool(b) => return write!(f, "'{b}'"),
            Token::Int(i) => return write!(f, "integer '{i}'"),
            Token::Float(x) => return write!(f, "float '{x}'"),
            Token::String(s) => return write!(f, "string {s:?}"),
            Token::Identifier(name) => return write!(f, "identifier '{name}'"),
            Token::BlockComment => "comment",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Mul => "'*'",
            Token::Div => "'/'",
            Token::Mod => "'%'",
            Token::Eq => "'=='",
            Token::NotEq => "'!='",
            Token::Less => "'<'",
            Token::Greater => "'>'",
            Token::LessEq => "'<='",
            Token::GreaterEq => "'>='",
            Token::And => "'and'",
            Token::Or => "'or'",
            Token::Not => "'not'",
            Token::Assign => "'='",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::Comma => "','",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Arrow => "'->'",
            Token::KeywordLet => "'let'",
            Token::KeywordVar => "'var'",
            Token::KeywordFn => "'fn'",
            Token::KeywordIf => "'if'",
            Token::KeywordElse => "'else'",
            Token::KeywordWhile => "'while'",
            Token::KeywordFor => "'for'",
            Token::KeywordReturn => "'return'",
            Token::KeywordStruct => "'struct'",
            Token::KeywordImport => "'import'",
            Token::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Span,
}

impl Lexeme {
    /// The exact source text this lexeme was produced from.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.range()]
    }
}

fn lex_error(error: LexError, slice: &str, span: Span) -> HelixError {
    let message = match error {
        LexError::UnexpectedCharacter => {
            format!("unrecognized character '{}'", slice.chars().next().unwrap_or(' '))
        }
        LexError::UnterminatedString => "unterminated string literal".to_string(),
        LexError::UnterminatedComment => "unterminated block comment".to_string(),
        LexError::MalformedNumber => format!("malformed numeric literal '{slice}'"),
    };
    HelixError::syntax(message, span)
}

/// Splits `source` into lexemes, ending with a single [`Token::Eof`].
#[tracing::instrument(level = "debug", skip_all)]
pub fn tokenize(source: &str) -> HelixResult<Vec<Lexeme>> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = index.span(lexer.span());
        match result {
            Ok(token) => tokens.push(Lexeme { token, span }),
            Err(error) => return Err(lex_error(error, lexer.slice(), span)),
        }
    }

    tokens.push(Lexeme {
        token: Token::Eof,
        span: index.span(source.len()..source.len()),
    });
    debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}
