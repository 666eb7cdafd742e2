use crate::ast::{Stmt, StmtKind, StructField};
use crate::errors::HelixResult;
use crate::lexer::Token;
use crate::parser::Parser;

impl Parser {
    /// `struct Name { field: T, ... }`, trailing comma allowed.
    pub fn parse_struct(&mut self) -> HelixResult<Stmt> {
        let keyword = self.expect(Token::KeywordStruct, "to start a struct")?;
        let (name, _) = self.expect_identifier("as the struct name")?;
        self.expect(Token::LBrace, "after the struct name")?;

        let mut fields = vec![];
        while !self.check(&Token::RBrace) {
            let (field, span) = self.expect_identifier("as a field name")?;
            self.expect(Token::Colon, "after field name")?;
            let annotation = self.parse_type_annot()?;
            fields.push(StructField {
                name: field,
                annotation,
                span,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let close = self.expect(Token::RBrace, "to close the struct")?;

        Ok(Stmt::new(
            StmtKind::StructDef { name, fields },
            keyword.span.to(close.span),
        ))
    }
}
