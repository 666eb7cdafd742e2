use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{Expr, FunctionDecl, Stmt, StmtKind, StructField};
use crate::errors::HelixError;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;
use crate::symbols::Symbol;
use crate::typechecker::{Type, is_subtype};
use crate::validation::Validator;
use crate::{t_bool, t_error, t_void};

const BUILTIN_TYPE_NAMES: [&str; 6] = ["int", "float", "bool", "string", "void", "any"];

impl Validator {
    /// Checks a statement list in the current scope. Struct and function
    /// declarations are registered first so siblings can refer to each other.
    pub(crate) fn check_block(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            if let StmtKind::StructDef { name, fields } = &stmt.kind {
                self.register_struct(name, fields, stmt.span);
            }
        }
        for stmt in statements {
            if let StmtKind::FunctionDef(decl) = &stmt.kind {
                let signature = self.function_signature(decl);
                self.signatures.insert(decl.span, signature.clone());
                self.declare(Symbol::new(&decl.name, signature).function().at(decl.span));
            }
        }
        for stmt in statements {
            self.check_stmt(stmt);
        }
    }

    fn register_struct(&mut self, name: &str, fields: &[StructField], span: Span) {
        if BUILTIN_TYPE_NAMES.contains(&name)
            || self.nominal_types.contains(name)
            || self.structs.contains_key(name)
        {
            self.type_error(format!("type '{name}' is already defined"), span);
            return;
        }

        let mut resolved = BTreeMap::new();
        for field in fields {
            let ty = self.resolve_annot(&field.annotation, field.span);
            if resolved.insert(field.name.clone(), ty).is_some() {
                self.type_error(
                    format!("field '{}' is declared twice in struct '{name}'", field.name),
                    field.span,
                );
            }
        }
        self.structs.insert(
            name.to_string(),
            Arc::new(Type::Struct {
                name: name.to_string(),
                fields: resolved,
            }),
        );
    }

    fn function_signature(&mut self, decl: &FunctionDecl) -> Arc<Type> {
        let params = decl
            .params
            .iter()
            .map(|param| self.resolve_annot(&param.annotation, param.span))
            .collect();
        let return_type = match &decl.return_type {
            Some(annot) => self.resolve_annot(annot, decl.span),
            None => t_void!(),
        };
        Arc::new(Type::Function {
            params,
            return_type,
        })
    }

    pub(crate) fn check_stmt(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.check_stmt_inner(stmt))
    }

    fn check_stmt_inner(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }

            StmtKind::VariableDecl {
                name,
                mutable,
                annotation,
                initializer,
            } => {
                let value_ty = self.check_expr(initializer);
                let declared = match annotation {
                    Some(annot) => {
                        let declared = self.resolve_annot(annot, stmt.span);
                        if !is_subtype(&value_ty, &declared) {
                            self.type_error(
                                format!(
                                    "cannot initialize '{name}' of type {declared} with a value of type {value_ty}"
                                ),
                                initializer.span,
                            );
                        }
                        declared
                    }
                    None => value_ty,
                };
                if *declared == Type::Void {
                    self.type_error(
                        format!("cannot bind '{name}' to a value of type void"),
                        initializer.span,
                    );
                }
                self.declare(Symbol::new(name, declared).mutable(*mutable).at(stmt.span));
            }

            StmtKind::Assignment { target, value } => {
                let value_ty = self.check_expr(value);
                let Some(symbol) = self.symbols.lookup(target) else {
                    self.type_error(format!("undefined variable '{target}'"), stmt.span);
                    return;
                };
                let (mutable, declared, level) =
                    (symbol.mutable, symbol.ty.clone(), symbol.scope_level);
                self.note_reference(target, level);
                if !mutable {
                    self.error(HelixError::mutation(
                        format!("cannot assign twice to immutable binding '{target}'"),
                        stmt.span,
                    ));
                } else if !is_subtype(&value_ty, &declared) {
                    self.type_error(
                        format!("cannot assign a value of type {value_ty} to '{target}' of type {declared}"),
                        value.span,
                    );
                }
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition, "if");
                self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }

            StmtKind::While { condition, body } => {
                self.check_condition(condition, "while");
                self.check_stmt(body);
            }

            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.enter_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(condition) = condition {
                    self.check_condition(condition, "for");
                }
                if let Some(increment) = increment {
                    self.check_stmt(increment);
                }
                self.check_stmt(body);
                self.exit_scope();
            }

            StmtKind::Return(value) => {
                let value_ty = match value {
                    Some(expr) => self.check_expr(expr),
                    None => t_void!(),
                };
                match self.return_types.last().cloned() {
                    None => self.type_error("'return' outside of a function body", stmt.span),
                    Some(expected) if !is_subtype(&value_ty, &expected) => self.type_error(
                        format!("expected a return value of type {expected}, found {value_ty}"),
                        stmt.span,
                    ),
                    Some(_) => {}
                }
            }

            StmtKind::Block(statements) => {
                self.enter_scope();
                self.check_block(statements);
                self.exit_scope();
            }

            StmtKind::FunctionDef(decl) => self.check_function(decl),

            // registered by `check_block`
            StmtKind::StructDef { .. } => {}

            StmtKind::Import(module) => {
                if !self.modules.contains(module) {
                    self.type_error(format!("unknown module '{module}'"), stmt.span);
                }
            }
        }
    }

    fn check_condition(&mut self, condition: &Expr, construct: &str) {
        let ty = self.check_expr(condition);
        if !is_subtype(&ty, &t_bool!()) {
            self.type_error(
                format!("{construct} condition must be bool, found {ty}"),
                condition.span,
            );
        }
    }

    fn check_function(&mut self, decl: &FunctionDecl) {
        let signature = self
            .signatures
            .get(&decl.span)
            .cloned()
            .unwrap_or_else(|| t_error!());
        let (params, return_type) = match &*signature {
            Type::Function {
                params,
                return_type,
            } => (params.clone(), return_type.clone()),
            _ => (vec![t_error!(); decl.params.len()], t_error!()),
        };

        let declared_in = self.symbols.current_level();
        self.functions.push((declared_in, decl.name.clone()));
        self.enter_scope();
        for (param, ty) in decl.params.iter().zip(params) {
            self.declare(Symbol::new(&param.name, ty).at(param.span));
        }
        self.return_types.push(return_type.clone());
        self.check_block(&decl.body);
        self.return_types.pop();
        self.exit_scope();
        self.functions.pop();

        if !matches!(*return_type, Type::Void | Type::Error) && !always_returns(&decl.body) {
            self.type_error(
                format!(
                    "function '{}' can reach its end without returning a value of type {return_type}",
                    decl.name
                ),
                decl.span,
            );
        }
    }
}

/// Whether every path through `statements` ends in a `return`. Loops are
/// assumed to possibly run zero times.
fn always_returns(statements: &[Stmt]) -> bool {
    statements.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(inner) => always_returns(inner),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => {
            always_returns(std::slice::from_ref(&**then_branch))
                && always_returns(std::slice::from_ref(&**else_branch))
        }
        _ => false,
    })
}
