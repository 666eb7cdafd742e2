use std::rc::Rc;

use crate::ast::{FunctionDecl, Param, Stmt, StmtKind, TypeAnnot};
use crate::errors::HelixResult;
use crate::lexer::Token;
use crate::parser::Parser;

impl Parser {
    /// `fn name(a: T, b: U) [-> R] { body }`
    pub fn parse_function(&mut self) -> HelixResult<Stmt> {
        let keyword = self.expect(Token::KeywordFn, "to start a function")?;
        let (name, _) = self.expect_identifier("as the function name after 'fn'")?;

        self.expect(Token::LParen, "after the function name")?;
        let mut params = vec![];
        if !self.check(&Token::RParen) {
            loop {
                let (param, span) = self.expect_identifier("as a parameter name")?;
                self.expect(Token::Colon, "after parameter name (parameters need a type)")?;
                let annotation = self.parse_type_annot()?;
                params.push(Param {
                    name: param,
                    annotation,
                    span,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "or ',' in parameter list")?;

        let return_type = if self.eat(&Token::Arrow) {
            Some(self.parse_type_annot()?)
        } else {
            None
        };

        if !self.check(&Token::LBrace) {
            return Err(self.unexpected("'{' to start the function body"));
        }
        let block = self.parse_block()?;
        let span = keyword.span.to(block.span);
        let StmtKind::Block(body) = block.kind else {
            unreachable!("parse_block always yields a block")
        };

        Ok(Stmt::new(
            StmtKind::FunctionDef(Rc::new(FunctionDecl {
                name,
                params,
                return_type,
                body,
                span,
            })),
            span,
        ))
    }

    pub fn parse_type_annot(&mut self) -> HelixResult<TypeAnnot> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(TypeAnnot::Named(name))
            }
            Token::LBracket => {
                self.advance();
                let elem = self.parse_type_annot()?;
                self.expect(Token::RBracket, "to close the array type")?;
                Ok(TypeAnnot::Array(Box::new(elem)))
            }
            Token::LParen => {
                self.advance();
                let elems = self.parse_type_list(Token::RParen)?;
                self.expect(Token::RParen, "to close the tuple type")?;
                Ok(TypeAnnot::Tuple(elems))
            }
            Token::KeywordFn => {
                self.advance();
                self.expect(Token::LParen, "after 'fn' in a function type")?;
                let params = self.parse_type_list(Token::RParen)?;
                self.expect(Token::RParen, "to close the parameter types")?;
                let return_type = if self.eat(&Token::Arrow) {
                    self.parse_type_annot()?
                } else {
                    TypeAnnot::Named("void".to_string())
                };
                Ok(TypeAnnot::Function {
                    params,
                    return_type: Box::new(return_type),
                })
            }
            _ => Err(self.unexpected("a type")),
        }
    }

    fn parse_type_list(&mut self, close: Token) -> HelixResult<Vec<TypeAnnot>> {
        let mut types = vec![];
        if self.check(&close) {
            return Ok(types);
        }
        loop {
            types.push(self.parse_type_annot()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(types)
    }
}
