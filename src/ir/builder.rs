use rustc_hash::FxHashMap;
use tracing::debug;

use std::rc::Rc;

use super::*;
use crate::ast::{Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind};
use crate::errors::{HelixError, HelixResult};
use crate::stack::ensure_sufficient_stack;

/// Lowers a program to IR, resolving every name to its declaration.
///
/// Keeps its own scope stack rather than trusting the validator's, so the IR
/// stays self-contained.
pub struct IRBuilder {
    scopes: Vec<FxHashMap<String, VarRef>>,
    var_counter: usize,
}

impl Default for IRBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IRBuilder {
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
            var_counter: 0,
        }
    }

    /// Names defined outside the program, such as natives and library exports.
    pub fn with_externals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.declare(name.into(), false);
        }
        self
    }

    /// Lowers `program` into a root block. The root shares the global scope,
    /// so it carries no scope of its own when executed. Globals stay
    /// declared, so later programs built with the same builder see them.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(&mut self, program: &Program) -> HelixResult<IrNode> {
        let span = match (program.statements.first(), program.statements.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::default(),
        };
        let mut children = self.lower_stmts(&program.statements)?;
        // Hoisted functions and dropped structs can leave an earlier
        // expression last, which would turn it into the program result.
        let ends_in_expr = matches!(
            program.statements.last().map(|stmt| &stmt.kind),
            Some(StmtKind::Expr(_))
        );
        if !ends_in_expr && children.last().is_some_and(IrNode::is_expression) {
            children.push(IrNode::block(vec![], span));
        }
        let root = IrNode::block(children, span);
        debug!(nodes = root.count(), vars = self.var_counter, "built ir");
        Ok(root)
    }

    fn declare(&mut self, name: String, mutable: bool) -> VarRef {
        let var = Rc::new(IrVar {
            id: self.var_counter,
            name: name.clone(),
            mutable,
        });
        self.var_counter += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, var.clone());
        }
        var
    }

    fn resolve(&self, name: &str, span: Span) -> HelixResult<VarRef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .ok_or_else(|| HelixError::type_error(format!("cannot lower unresolved name '{name}'"), span))
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> HelixResult<T>) -> HelixResult<T> {
        self.scopes.push(FxHashMap::default());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Functions are declared before anything is lowered, so siblings can
    /// reference each other, and are emitted ahead of the other statements.
    /// Bodies still lower at their source position.
    fn lower_stmts(&mut self, stmts: &[Stmt]) -> HelixResult<Vec<IrNode>> {
        let mut declared = vec![];
        for stmt in stmts {
            if let StmtKind::FunctionDef(decl) = &stmt.kind {
                declared.push(self.declare(decl.name.clone(), false));
            }
        }

        let mut declared = declared.into_iter();
        let mut functions = vec![];
        let mut rest = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::FunctionDef(decl) => {
                    let Some(var) = declared.next() else {
                        return Err(HelixError::type_error(
                            format!("function '{}' was never declared", decl.name),
                            stmt.span,
                        ));
                    };
                    functions.push(self.lower_function(decl, var)?);
                }
                _ => rest.extend(self.lower_stmt(stmt)?),
            }
        }
        functions.extend(rest);
        Ok(functions)
    }

    fn lower_function(&mut self, decl: &FunctionDecl, var: VarRef) -> HelixResult<IrNode> {
        self.scoped(|this| {
            let params = decl
                .params
                .iter()
                .map(|param| this.declare(param.name.clone(), false))
                .collect();
            let body = this.lower_stmts(&decl.body)?;
            Ok(IrNode::new(IrKind::Function { var, params }, body, decl.span))
        })
    }

    fn lower_block(&mut self, stmts: &[Stmt], span: Span) -> HelixResult<IrNode> {
        self.scoped(|this| Ok(IrNode::block(this.lower_stmts(stmts)?, span)))
    }

    /// Lowers a nested statement that must produce a node, such as a branch.
    fn lower_branch(&mut self, stmt: &Stmt) -> HelixResult<IrNode> {
        Ok(self
            .lower_stmt(stmt)?
            .unwrap_or_else(|| IrNode::block(vec![], stmt.span)))
    }

    /// Type-level statements lower to nothing.
    fn lower_stmt(&mut self, stmt: &Stmt) -> HelixResult<Option<IrNode>> {
        ensure_sufficient_stack(|| self.lower_stmt_inner(stmt))
    }

    fn lower_stmt_inner(&mut self, stmt: &Stmt) -> HelixResult<Option<IrNode>> {
        let span = stmt.span;
        let node = match &stmt.kind {
            StmtKind::Expr(expr) => self.lower_expr(expr)?,
            StmtKind::VariableDecl {
                name,
                mutable,
                initializer,
                ..
            } => {
                let value = self.lower_expr(initializer)?;
                let target = self.declare(name.clone(), *mutable);
                IrNode::new(
                    IrKind::Assignment {
                        target,
                        declare: true,
                    },
                    vec![value],
                    span,
                )
            }
            StmtKind::Assignment { target, value } => {
                let value = self.lower_expr(value)?;
                let target = self.resolve(target, span)?;
                IrNode::new(
                    IrKind::Assignment {
                        target,
                        declare: false,
                    },
                    vec![value],
                    span,
                )
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.lower_expr(condition)?;
                let then_branch = self.lower_branch(then_branch)?;
                let else_branch = match else_branch {
                    Some(stmt) => self.lower_branch(stmt)?,
                    None => IrNode::block(vec![], span),
                };
                IrNode::new(IrKind::If, vec![condition, then_branch, else_branch], span)
            }
            StmtKind::While { condition, body } => {
                let condition = self.lower_expr(condition)?;
                let body = self.lower_branch(body)?;
                IrNode::new(IrKind::While, vec![condition, body], span)
            }
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => self.scoped(|this| {
                let mut outer = vec![];
                if let Some(init) = init {
                    outer.extend(this.lower_stmt(init)?);
                }
                let condition = match condition {
                    Some(condition) => this.lower_expr(condition)?,
                    None => IrNode::constant(Constant::Bool(true), span),
                };
                let iteration = this.scoped(|this| {
                    let mut steps = vec![this.lower_branch(body)?];
                    if let Some(increment) = increment {
                        steps.extend(this.lower_stmt(increment)?);
                    }
                    Ok(IrNode::block(steps, body.span))
                })?;
                outer.push(
                    IrNode::new(IrKind::While, vec![condition, iteration], span)
                        .annotate("lowered_from", "for"),
                );
                Ok(IrNode::block(outer, span))
            })?,
            StmtKind::Return(value) => {
                let children = match value {
                    Some(expr) => vec![self.lower_expr(expr)?],
                    None => vec![],
                };
                IrNode::new(IrKind::Return, children, span)
            }
            StmtKind::Block(stmts) => self.lower_block(stmts, span)?,
            // Emitted by `lower_stmts` ahead of the other statements.
            StmtKind::FunctionDef(_) => return Ok(None),
            StmtKind::StructDef { .. } | StmtKind::Import(_) => return Ok(None),
        };
        Ok(Some(node))
    }

    fn lower_expr(&mut self, expr: &Expr) -> HelixResult<IrNode> {
        ensure_sufficient_stack(|| self.lower_expr_inner(expr))
    }

    fn lower_expr_inner(&mut self, expr: &Expr) -> HelixResult<IrNode> {
        let span = expr.span;
        Ok(match &expr.kind {
            ExprKind::Literal(literal) => IrNode::constant(
                match literal {
                    Literal::Int(i) => Constant::Int(*i),
                    Literal::Float(x) => Constant::Float(*x),
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::String(s) => Constant::Str(s.clone()),
                },
                span,
            ),
            ExprKind::Variable(name) => {
                IrNode::new(IrKind::Variable(self.resolve(name, span)?), vec![], span)
            }
            ExprKind::BinaryOp { op, left, right } => {
                let left = self.lower_expr(left)?;
                let right = self.lower_expr(right)?;
                IrNode::new(IrKind::BinaryOp(*op), vec![left, right], span)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.lower_expr(operand)?;
                IrNode::new(IrKind::UnaryOp(*op), vec![operand], span)
            }
            ExprKind::Call { callee, args } => {
                let callee = self.resolve(callee, span)?;
                let args = args
                    .iter()
                    .map(|arg| self.lower_expr(arg))
                    .collect::<HelixResult<Vec<_>>>()?;
                IrNode::new(IrKind::Call { callee }, args, span)
            }
        })
    }
}
