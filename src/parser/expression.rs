use crate::ast::{BinOp, Expr, ExprKind, Literal, UnOp};
use crate::errors::HelixResult;
use crate::lexer::Token;
use crate::parser::Parser;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;

fn binary_operator(token: &Token) -> Option<BinOp> {
    let op = match token {
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::Mul => BinOp::Mul,
        Token::Div => BinOp::Div,
        Token::Mod => BinOp::Mod,
        Token::Eq => BinOp::Eq,
        Token::NotEq => BinOp::NotEq,
        Token::Less => BinOp::Less,
        Token::LessEq => BinOp::LessEq,
        Token::Greater => BinOp::Greater,
        Token::GreaterEq => BinOp::GreaterEq,
        Token::And => BinOp::And,
        Token::Or => BinOp::Or,
        _ => return None,
    };
    Some(op)
}

impl Parser {
    pub fn parse_expression(&mut self) -> HelixResult<Expr> {
        ensure_sufficient_stack(|| self.parse_binary(1))
    }

    /// Precedence climbing. The right operand is parsed with a floor one above
    /// the operator's own precedence, which makes every operator left-associative.
    fn parse_binary(&mut self, min_precedence: u8) -> HelixResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(op) = binary_operator(self.peek()) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> HelixResult<Expr> {
        let op = match self.peek() {
            Token::Minus => UnOp::Neg,
            Token::Not => UnOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.advance().span;
        let operand = ensure_sufficient_stack(|| self.parse_unary())?;
        let span = start.to(operand.span);
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_primary(&mut self) -> HelixResult<Expr> {
        let lexeme = self.current().clone();
        let literal = match lexeme.token {
            Token::Int(i) => Literal::Int(i),
            Token::Float(f) => Literal::Float(f),
            Token::Bool(b) => Literal::Bool(b),
            Token::String(s) => Literal::String(s),

            Token::Identifier(name) => {
                self.advance();
                if self.check(&Token::LParen) {
                    return self.parse_call(name, lexeme.span);
                }
                return Ok(Expr::new(ExprKind::Variable(name), lexeme.span));
            }

            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "to close the parenthesized expression")?;
                return Ok(inner);
            }

            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(ExprKind::Literal(literal), lexeme.span))
    }

    fn parse_call(&mut self, callee: String, start: Span) -> HelixResult<Expr> {
        self.expect(Token::LParen, "to start the argument list")?;
        let mut args = vec![];
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(Token::RParen, "or ',' in argument list")?;
        Ok(Expr::new(
            ExprKind::Call { callee, args },
            start.to(close.span),
        ))
    }
}
