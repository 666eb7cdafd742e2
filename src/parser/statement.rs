use crate::ast::{Stmt, StmtKind};
use crate::errors::HelixResult;
use crate::lexer::Token;
use crate::parser::Parser;
use crate::stack::ensure_sufficient_stack;

impl Parser {
    pub fn parse_statement(&mut self) -> HelixResult<Stmt> {
        ensure_sufficient_stack(|| self.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> HelixResult<Stmt> {
        match self.peek() {
            Token::KeywordLet | Token::KeywordVar => {
                let stmt = self.parse_variable_decl()?;
                self.expect(Token::Semicolon, "after variable declaration")?;
                Ok(stmt)
            }
            Token::KeywordFn => self.parse_function(),
            Token::KeywordIf => self.parse_if(),
            Token::KeywordWhile => self.parse_while(),
            Token::KeywordFor => self.parse_for(),
            Token::KeywordReturn => self.parse_return(),
            Token::KeywordStruct => self.parse_struct(),
            Token::KeywordImport => self.parse_import(),
            Token::LBrace => self.parse_block(),
            _ => {
                let stmt = self.parse_simple_statement()?;
                // The final expression of a program may omit its `;`.
                let tail = matches!(stmt.kind, StmtKind::Expr(_)) && self.at_end();
                if !tail {
                    self.expect(Token::Semicolon, "after statement")?;
                }
                Ok(stmt)
            }
        }
    }

    /// `let name[: type] = expr` or `var ...`, without the trailing `;`.
    pub(crate) fn parse_variable_decl(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        let mutable = keyword.token == Token::KeywordVar;
        let (name, _) = self.expect_identifier("as the variable name")?;
        let annotation = if self.eat(&Token::Colon) {
            Some(self.parse_type_annot()?)
        } else {
            None
        };
        self.expect(Token::Assign, "in variable declaration")?;
        let initializer = self.parse_expression()?;
        let span = keyword.span.to(initializer.span);
        Ok(Stmt::new(
            StmtKind::VariableDecl {
                name,
                mutable,
                annotation,
                initializer,
            },
            span,
        ))
    }

    /// Assignment or expression statement, without the trailing `;`.
    pub(crate) fn parse_simple_statement(&mut self) -> HelixResult<Stmt> {
        if let (Token::Identifier(target), Token::Assign) = (self.peek(), self.peek_nth(1)) {
            let target = target.clone();
            let start = self.advance().span;
            self.advance();
            let value = self.parse_expression()?;
            let span = start.to(value.span);
            return Ok(Stmt::new(StmtKind::Assignment { target, value }, span));
        }

        let expr = self.parse_expression()?;
        if self.check(&Token::Assign) {
            return Err(self.unexpected("';' (only variables can be assigned to)"));
        }
        let span = expr.span;
        Ok(Stmt::new(StmtKind::Expr(expr), span))
    }

    pub fn parse_block(&mut self) -> HelixResult<Stmt> {
        let open = self.expect(Token::LBrace, "to open a block")?;
        let mut statements = vec![];
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.unexpected("'}' to close the block"));
            }
            statements.push(self.parse_statement()?);
        }
        let close = self.advance();
        Ok(Stmt::new(
            StmtKind::Block(statements),
            open.span.to(close.span),
        ))
    }

    fn parse_if(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        let condition = self.parse_expression()?;
        if !self.check(&Token::LBrace) {
            return Err(self.unexpected("'{' after if condition"));
        }
        let then_branch = self.parse_block()?;
        let mut end = then_branch.span;

        let else_branch = if self.eat(&Token::KeywordElse) {
            let branch = if self.check(&Token::KeywordIf) {
                self.parse_if()?
            } else if self.check(&Token::LBrace) {
                self.parse_block()?
            } else {
                return Err(self.unexpected("'{' or 'if' after 'else'"));
            };
            end = branch.span;
            Some(Box::new(branch))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch: Box::new(then_branch),
                else_branch,
            },
            keyword.span.to(end),
        ))
    }

    fn parse_while(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        let condition = self.parse_expression()?;
        if !self.check(&Token::LBrace) {
            return Err(self.unexpected("'{' after while condition"));
        }
        let body = self.parse_block()?;
        let span = keyword.span.to(body.span);
        Ok(Stmt::new(
            StmtKind::While {
                condition,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_for(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        self.expect(Token::LParen, "after 'for'")?;

        let init = if self.check(&Token::Semicolon) {
            None
        } else if matches!(self.peek(), Token::KeywordLet | Token::KeywordVar) {
            Some(Box::new(self.parse_variable_decl()?))
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(Token::Semicolon, "after for-loop initializer")?;

        let condition = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon, "after for-loop condition")?;

        let increment = if self.check(&Token::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(Token::RParen, "to close the for-loop header")?;

        if !self.check(&Token::LBrace) {
            return Err(self.unexpected("'{' after for-loop header"));
        }
        let body = self.parse_block()?;
        let span = keyword.span.to(body.span);
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                increment,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_return(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        let value = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let end = self.expect(Token::Semicolon, "after return")?;
        Ok(Stmt::new(StmtKind::Return(value), keyword.span.to(end.span)))
    }

    fn parse_import(&mut self) -> HelixResult<Stmt> {
        let keyword = self.advance();
        let (module, _) = self.expect_identifier("after 'import'")?;
        let end = self.expect(Token::Semicolon, "after import")?;
        Ok(Stmt::new(StmtKind::Import(module), keyword.span.to(end.span)))
    }
}
