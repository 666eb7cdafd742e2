use std::sync::Arc;

use crate::ast::{BinOp, Expr, ExprKind, Literal, UnOp};
use crate::stack::ensure_sufficient_stack;
use crate::typechecker::{Type, is_subtype, unify};
use crate::validation::Validator;
use crate::{t_bool, t_error, t_float, t_int, t_string};

impl Validator {
    pub(crate) fn check_expr(&mut self, expr: &Expr) -> Arc<Type> {
        ensure_sufficient_stack(|| self.check_expr_inner(expr))
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> Arc<Type> {
        match &expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Int(_) => t_int!(),
                Literal::Float(_) => t_float!(),
                Literal::Bool(_) => t_bool!(),
                Literal::String(_) => t_string!(),
            },

            ExprKind::Variable(name) => match self.symbols.lookup(name) {
                Some(symbol) => {
                    let (ty, level) = (symbol.ty.clone(), symbol.scope_level);
                    self.note_reference(name, level);
                    ty
                }
                None => {
                    self.type_error(format!("undefined variable '{name}'"), expr.span);
                    t_error!()
                }
            },

            ExprKind::BinaryOp { op, left, right } => {
                let left_ty = self.check_expr(left);
                let right_ty = self.check_expr(right);
                self.check_binary(*op, left_ty, right_ty, expr)
            }

            ExprKind::UnaryOp { op, operand } => {
                let ty = self.check_expr(operand);
                match op {
                    UnOp::Neg if ty.is_numeric() => ty,
                    UnOp::Not if is_subtype(&ty, &Type::Bool) => t_bool!(),
                    _ => {
                        self.type_error(
                            format!("operator '{op}' cannot be applied to {ty}"),
                            expr.span,
                        );
                        t_error!()
                    }
                }
            }

            ExprKind::Call { callee, args } => self.check_call(callee, args, expr),
        }
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        left: Arc<Type>,
        right: Arc<Type>,
        expr: &Expr,
    ) -> Arc<Type> {
        let result = if op == BinOp::Add && *left == Type::String && *right == Type::String {
            Some(t_string!())
        } else if op.is_arithmetic() {
            if left.is_numeric() && right.is_numeric() {
                unify(&left, &right)
            } else {
                None
            }
        } else if op.is_ordering() {
            (left.is_numeric() && right.is_numeric()).then(|| t_bool!())
        } else if matches!(op, BinOp::Eq | BinOp::NotEq) {
            unify(&left, &right).map(|_| t_bool!())
        } else {
            (is_subtype(&left, &Type::Bool) && is_subtype(&right, &Type::Bool)).then(|| t_bool!())
        };

        result.unwrap_or_else(|| {
            self.type_error(
                format!("operator '{op}' cannot be applied to {left} and {right}"),
                expr.span,
            );
            t_error!()
        })
    }

    fn check_call(&mut self, callee: &str, args: &[Expr], expr: &Expr) -> Arc<Type> {
        let arg_types: Vec<Arc<Type>> = args.iter().map(|arg| self.check_expr(arg)).collect();

        let Some(symbol) = self.symbols.lookup(callee) else {
            self.type_error(format!("undefined function '{callee}'"), expr.span);
            return t_error!();
        };
        let (callee_ty, level) = (symbol.ty.clone(), symbol.scope_level);
        self.note_reference(callee, level);

        match &*callee_ty {
            Type::Function {
                params,
                return_type,
            } => {
                if params.len() != arg_types.len() {
                    self.type_error(
                        format!(
                            "function '{callee}' expects {} argument(s) but {} were given",
                            params.len(),
                            arg_types.len()
                        ),
                        expr.span,
                    );
                    return return_type.clone();
                }
                for (index, ((param, arg), arg_expr)) in
                    params.iter().zip(&arg_types).zip(args).enumerate()
                {
                    if !is_subtype(arg, param) {
                        self.type_error(
                            format!(
                                "argument {} of '{callee}' expects {param}, found {arg}",
                                index + 1
                            ),
                            arg_expr.span,
                        );
                    }
                }
                return_type.clone()
            }
            Type::Error => t_error!(),
            other => {
                self.type_error(
                    format!("'{callee}' is not a function (it has type {other})"),
                    expr.span,
                );
                t_error!()
            }
        }
    }
}
