use tracing::debug;

use std::rc::Rc;

use crate::ast::{Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind};
use crate::errors::{HelixError, HelixResult};
use crate::runtime::frame::CallFrame;
use crate::runtime::operators;
use crate::runtime::value::{Closure, ClosureBody, Value};
use crate::runtime::Runtime;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;

/// How a statement finished. Errors travel separately in the `Err` arm.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Return(Value),
}

/// Tree-walking execution of a validated program.
pub struct Interpreter<'rt> {
    rt: &'rt mut Runtime,
}

impl<'rt> Interpreter<'rt> {
    pub fn new(rt: &'rt mut Runtime) -> Self {
        Interpreter { rt }
    }

    /// Runs `program` in the global scope. The result is the value of a
    /// trailing expression statement, or unit.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&mut self, program: &Program) -> HelixResult<Value> {
        self.hoist(&program.statements)?;
        let mut result = Value::Unit;
        for stmt in &program.statements {
            result = Value::Unit;
            match &stmt.kind {
                StmtKind::FunctionDef(_) => {}
                StmtKind::Expr(expr) => result = self.eval(expr)?,
                _ => {
                    if let Completion::Return(value) = self.exec(stmt)? {
                        return Ok(value);
                    }
                }
            }
        }
        debug!(heap = ?self.rt.heap().stats(), "program finished");
        Ok(result)
    }

    /// Binds every function declared directly in `stmts` before any of them
    /// runs, so siblings can call each other regardless of order.
    fn hoist(&mut self, stmts: &[Stmt]) -> HelixResult<()> {
        for stmt in stmts {
            if let StmtKind::FunctionDef(decl) = &stmt.kind {
                let closure = Closure {
                    name: decl.name.clone(),
                    params: decl.params.iter().map(|p| p.name.clone()).collect(),
                    body: ClosureBody::Ast(decl.clone()),
                    env: self.rt.current_env(),
                };
                self.rt.declare(&decl.name, Value::Function(Rc::new(closure)))?;
            }
        }
        Ok(())
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> HelixResult<Completion> {
        self.hoist(stmts)?;
        for stmt in stmts {
            if let Completion::Return(value) = self.exec(stmt)? {
                return Ok(Completion::Return(value));
            }
        }
        Ok(Completion::Normal)
    }

    /// Runs `body` inside a fresh scope. The scope is popped on every exit
    /// path, including errors.
    fn scoped(
        &mut self,
        body: impl FnOnce(&mut Self) -> HelixResult<Completion>,
    ) -> HelixResult<Completion> {
        self.rt.push_scope();
        let result = body(self);
        let popped = self.rt.pop_scope();
        let completion = result?;
        popped?;
        Ok(completion)
    }

    pub fn exec(&mut self, stmt: &Stmt) -> HelixResult<Completion> {
        ensure_sufficient_stack(|| self.exec_inner(stmt))
    }

    fn exec_inner(&mut self, stmt: &Stmt) -> HelixResult<Completion> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::VariableDecl {
                name, initializer, ..
            } => {
                let value = self.eval(initializer)?;
                self.rt.declare(name, value)?;
            }
            StmtKind::Assignment { target, value } => {
                let value = self.eval(value)?;
                self.rt.assign(target, value, stmt.span)?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    return self.exec(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.exec(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition)? {
                    if let Completion::Return(value) = self.exec(body)? {
                        return Ok(Completion::Return(value));
                    }
                }
            }
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                return self.scoped(|this| {
                    if let Some(init) = init {
                        this.exec(init)?;
                    }
                    loop {
                        if let Some(condition) = condition {
                            if !this.condition(condition)? {
                                break;
                            }
                        }
                        if let Completion::Return(value) = this.exec(body)? {
                            return Ok(Completion::Return(value));
                        }
                        if let Some(increment) = increment {
                            this.exec(increment)?;
                        }
                    }
                    Ok(Completion::Normal)
                });
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Unit,
                };
                return Ok(Completion::Return(value));
            }
            StmtKind::Block(stmts) => return self.scoped(|this| this.exec_stmts(stmts)),
            // Bound by `hoist` when the enclosing block was entered.
            StmtKind::FunctionDef(_) => {}
            StmtKind::StructDef { .. } | StmtKind::Import(_) => {}
        }
        Ok(Completion::Normal)
    }

    fn condition(&mut self, expr: &Expr) -> HelixResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(HelixError::runtime(
                format!("condition must be a bool, found {}", other.type_name()),
                expr.span,
            )),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> HelixResult<Value> {
        ensure_sufficient_stack(|| self.eval_inner(expr))
    }

    fn eval_inner(&mut self, expr: &Expr) -> HelixResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(x) => Value::Float(*x),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::String(s) => Value::Str(s.as_str().into()),
            }),
            ExprKind::Variable(name) => self.rt.lookup(name, expr.span),
            ExprKind::BinaryOp { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                operators::binary(*op, &left, &right)
                    .map_err(|message| HelixError::runtime(message, expr.span))
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand)?;
                operators::unary(*op, &operand)
                    .map_err(|message| HelixError::runtime(message, expr.span))
            }
            ExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<HelixResult<Vec<_>>>()?;
                self.call(callee, args, expr.span)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>, span: Span) -> HelixResult<Value> {
        match self.rt.lookup(name, span)? {
            Value::Native(native) => {
                check_arity(name, native.arity(), args.len(), span)?;
                (native.func)(self.rt.printer(), &args)
                    .map_err(|message| HelixError::runtime(message, span))
            }
            Value::Function(closure) => {
                check_arity(name, closure.params.len(), args.len(), span)?;
                let ClosureBody::Ast(decl) = &closure.body else {
                    return Err(HelixError::runtime(
                        format!("'{name}' was compiled to bytecode and cannot be interpreted"),
                        span,
                    ));
                };
                self.rt.enter_call(
                    CallFrame::new(&closure.name, closure.env.clone()).called_at(span),
                )?;
                let result = self.call_body(decl, &closure.params, args);
                let exited = self.rt.exit_call();
                let completion = result?;
                exited?;
                Ok(match completion {
                    Completion::Return(value) => value,
                    Completion::Normal => Value::Unit,
                })
            }
            other => Err(HelixError::runtime(
                format!("'{name}' is not a function (found {})", other.type_name()),
                span,
            )),
        }
    }

    fn call_body(
        &mut self,
        decl: &FunctionDecl,
        params: &[String],
        args: Vec<Value>,
    ) -> HelixResult<Completion> {
        for (param, arg) in params.iter().zip(args) {
            self.rt.declare(param, arg)?;
        }
        self.exec_stmts(&decl.body)
    }
}

pub(crate) fn check_arity(name: &str, expected: usize, found: usize, span: Span) -> HelixResult<()> {
    if expected == found {
        return Ok(());
    }
    Err(HelixError::runtime(
        format!("function '{name}' expects {expected} argument(s) but got {found}"),
        span,
    ))
}
