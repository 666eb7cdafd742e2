use super::*;
use crate::errors::ErrorKind;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn kinds(input: &str) -> Vec<Token> {
    tokenize(input)
        .unwrap()
        .into_iter()
        .map(|lexeme| lexeme.token)
        .collect()
}

#[test]
fn test_basic_tokens() {
    assert_eq!(
        kinds("let x = 5;"),
        vec![
            Token::KeywordLet,
            Token::Identifier("x".to_string()),
            Token::Assign,
            Token::Int(5),
            Token::Semicolon,
            Token::Eof,
        ]
    );
}

#[test]
fn test_keywords_and_identifiers() {
    assert_eq!(
        kinds("fn iffy if var variable"),
        vec![
            Token::KeywordFn,
            Token::Identifier("iffy".to_string()),
            Token::KeywordIf,
            Token::KeywordVar,
            Token::Identifier("variable".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_two_char_operators_win() {
    assert_eq!(
        kinds("a <= b == c != d >= e -> f"),
        vec![
            Token::Identifier("a".to_string()),
            Token::LessEq,
            Token::Identifier("b".to_string()),
            Token::Eq,
            Token::Identifier("c".to_string()),
            Token::NotEq,
            Token::Identifier("d".to_string()),
            Token::GreaterEq,
            Token::Identifier("e".to_string()),
            Token::Arrow,
            Token::Identifier("f".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_operator_synonyms() {
    assert_eq!(
        kinds("a && b || !c and not d or e"),
        vec![
            Token::Identifier("a".to_string()),
            Token::And,
            Token::Identifier("b".to_string()),
            Token::Or,
            Token::Not,
            Token::Identifier("c".to_string()),
            Token::And,
            Token::Not,
            Token::Identifier("d".to_string()),
            Token::Or,
            Token::Identifier("e".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_numbers() {
    assert_eq!(
        kinds("0 42 3.14 2."),
        vec![
            Token::Int(0),
            Token::Int(42),
            Token::Float(3.14),
            Token::Float(2.0),
            Token::Eof,
        ]
    );
}

#[test]
fn test_second_decimal_point_is_fatal() {
    let err = tokenize("let x = 1.2.3;").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.message().contains("malformed numeric literal"));
    assert_eq!((err.span().line, err.span().column), (1, 9));
}

#[test]
fn test_integer_overflow_is_malformed() {
    let err = tokenize("99999999999999999999").unwrap_err();
    assert!(err.message().contains("malformed"));
}

#[test]
fn test_string_escapes() {
    assert_eq!(
        kinds(r#""hello\nworld" 'it\'s' "tab\there" "q\"uote" "back\\slash" "\q""#),
        vec![
            Token::String("hello\nworld".to_string()),
            Token::String("it's".to_string()),
            Token::String("tab\there".to_string()),
            Token::String("q\"uote".to_string()),
            Token::String("back\\slash".to_string()),
            Token::String("q".to_string()),
            Token::Eof,
        ]
    );
}

#[test]
fn test_unterminated_string() {
    let err = tokenize("let s = \"abc;\nlet t = 1;").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.message().contains("unterminated string"));
    assert_eq!((err.span().line, err.span().column), (1, 9));
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("1 // line comment\n/* block\n comment */ 2"),
        vec![Token::Int(1), Token::Int(2), Token::Eof]
    );
}

#[test]
fn test_unterminated_block_comment() {
    let err = tokenize("1 /* never closed").unwrap_err();
    assert!(err.message().contains("unterminated block comment"));
}

#[test]
fn test_unrecognized_character() {
    let err = tokenize("let x = 5;\nlet @ y").unwrap_err();
    assert!(err.message().contains("'@'"));
    assert_eq!((err.span().line, err.span().column), (2, 5));
}

#[test]
fn test_positions() {
    let tokens = tokenize("let a = 1;\n  a = 2;").unwrap();
    let a = &tokens[5];
    assert_eq!(a.token, Token::Identifier("a".to_string()));
    assert_eq!((a.span.line, a.span.column), (2, 3));
    let eof = tokens.last().unwrap();
    assert_eq!(eof.token, Token::Eof);
    assert_eq!(eof.span.line, 2);
}

#[test]
fn test_empty_input_is_just_eof() {
    assert_eq!(kinds("  \n // nothing\n"), vec![Token::Eof]);
}

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_][a-z0-9_]{0,6}",
        "[0-9]{1,6}",
        "[0-9]{1,3}\\.[0-9]{1,3}",
        "\"[a-z ]{0,5}\"",
        Just("==".to_string()),
        Just("<=".to_string()),
        Just("+".to_string()),
        Just("(".to_string()),
        Just(";".to_string()),
        Just("->".to_string()),
    ]
}

fn separator() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(" ".to_string()),
        Just("\n\t".to_string()),
        Just(" /* c */ ".to_string()),
        Just(" // c\n".to_string()),
    ]
}

proptest! {
    #[test]
    fn lexemes_reproduce_significant_text(
        parts in proptest::collection::vec((fragment(), separator()), 1..20)
    ) {
        let mut source = String::new();
        let mut significant = String::new();
        for (fragment, sep) in &parts {
            source.push_str(fragment);
            source.push_str(sep);
            significant.push_str(fragment);
        }

        let tokens = tokenize(&source).unwrap();
        let rebuilt: String = tokens.iter().map(|lexeme| lexeme.text(&source)).collect();
        prop_assert_eq!(rebuilt, significant);
        prop_assert_eq!(tokens.last().map(|l| l.token.clone()), Some(Token::Eof));
    }
}
