use rustc_hash::FxHashMap;
use tracing::debug;

use std::fmt::{self, Display, Formatter};

use crate::errors::{HelixError, HelixResult};
use crate::ir::{Constant, IrKind, IrNode};
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;

pub mod function;
pub mod instruction;

#[cfg(test)]
pub mod test;

pub use instruction::Instruction;

/// A loaded instruction listing with every label and function extent
/// resolved up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    instructions: Vec<Instruction>,
    labels: FxHashMap<String, usize>,
    function_ends: FxHashMap<usize, usize>,
}

/// Position of an instruction, reported as line `index + 1`.
pub fn instruction_span(index: usize) -> Span {
    Span::new(index, index + 1, index + 1, 1)
}

impl Bytecode {
    pub fn new(instructions: Vec<Instruction>) -> HelixResult<Self> {
        let mut labels = FxHashMap::default();
        let mut function_ends = FxHashMap::default();
        let mut open_functions = vec![];

        for (index, instruction) in instructions.iter().enumerate() {
            match instruction {
                Instruction::Label(label) => {
                    if labels.insert(label.clone(), index).is_some() {
                        return Err(HelixError::syntax(
                            format!("label '{label}' is defined twice"),
                            instruction_span(index),
                        ));
                    }
                }
                Instruction::FuncStart(_) => open_functions.push(index),
                Instruction::FuncEnd => {
                    let start = open_functions.pop().ok_or_else(|| {
                        HelixError::syntax("FUNC_END without FUNC_START", instruction_span(index))
                    })?;
                    function_ends.insert(start, index);
                }
                _ => {}
            }
        }
        if let Some(&start) = open_functions.last() {
            return Err(HelixError::syntax(
                "FUNC_START without FUNC_END",
                instruction_span(start),
            ));
        }
        for (index, instruction) in instructions.iter().enumerate() {
            if let Instruction::Jump(label) | Instruction::JumpIfFalse(label) = instruction {
                if !labels.contains_key(label) {
                    return Err(HelixError::syntax(
                        format!("jump to unknown label '{label}'"),
                        instruction_span(index),
                    ));
                }
            }
        }

        Ok(Bytecode {
            instructions,
            labels,
            function_ends,
        })
    }

    /// Loads a listing. Blank lines and lines starting with `;` are skipped,
    /// but still count towards reported line numbers.
    pub fn parse(text: &str) -> HelixResult<Self> {
        let mut instructions = vec![];
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let instruction = line.parse().map_err(|message: String| {
                HelixError::syntax(message, Span::new(0, 0, line_no + 1, 1))
            })?;
            instructions.push(instruction);
        }
        Self::new(instructions)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Index of the `FUNC_END` matching the `FUNC_START` at `start`.
    pub fn function_end(&self, start: usize) -> Option<usize> {
        self.function_ends.get(&start).copied()
    }
}

impl Display for Bytecode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

/// Lowers IR to a linear instruction sequence. Expressions leave exactly
/// one value on the operand stack and statements leave it unchanged.
#[derive(Debug, Default)]
pub struct Emitter {
    code: Vec<Instruction>,
    label_counter: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a root block. A trailing expression statement keeps its
    /// value on the stack as the program's result.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(mut self, root: &IrNode) -> HelixResult<Bytecode> {
        let last = root.children.len().saturating_sub(1);
        for (i, stmt) in root.children.iter().enumerate() {
            if i == last && stmt.is_expression() {
                self.emit_expr(stmt)?;
            } else {
                self.emit_stmt(stmt)?;
            }
        }
        debug!(instructions = self.code.len(), labels = self.label_counter, "emitted bytecode");
        Bytecode::new(self.code)
    }

    pub(crate) fn push(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn next_label(&mut self) -> usize {
        let n = self.label_counter;
        self.label_counter += 1;
        n
    }

    pub(crate) fn emit_stmts(&mut self, stmts: &[IrNode]) -> HelixResult<()> {
        stmts.iter().try_for_each(|stmt| self.emit_stmt(stmt))
    }

    pub(crate) fn emit_stmt(&mut self, node: &IrNode) -> HelixResult<()> {
        ensure_sufficient_stack(|| self.emit_stmt_inner(node))
    }

    fn emit_stmt_inner(&mut self, node: &IrNode) -> HelixResult<()> {
        if node.is_expression() {
            self.emit_expr(node)?;
            self.push(Instruction::Pop);
            return Ok(());
        }

        match (&node.kind, node.children.as_slice()) {
            (IrKind::Function { var, params }, body) => self.emit_function(var, params, body),
            (IrKind::Assignment { target, declare }, [value]) => {
                self.emit_expr(value)?;
                self.push(if *declare {
                    Instruction::Declare(target.name.clone())
                } else {
                    Instruction::Store(target.name.clone())
                });
                Ok(())
            }
            (IrKind::If, [condition, then_branch, else_branch]) => {
                let n = self.next_label();
                let else_label = format!("else_{n}");
                let end_label = format!("endif_{n}");
                self.emit_expr(condition)?;
                self.push(Instruction::JumpIfFalse(else_label.clone()));
                self.emit_stmt(then_branch)?;
                self.push(Instruction::Jump(end_label.clone()));
                self.push(Instruction::Label(else_label));
                self.emit_stmt(else_branch)?;
                self.push(Instruction::Label(end_label));
                Ok(())
            }
            (IrKind::While, [condition, body]) => {
                let n = self.next_label();
                let start_label = format!("while_start_{n}");
                let end_label = format!("while_end_{n}");
                self.push(Instruction::Label(start_label.clone()));
                self.emit_expr(condition)?;
                self.push(Instruction::JumpIfFalse(end_label.clone()));
                self.emit_stmt(body)?;
                self.push(Instruction::Jump(start_label));
                self.push(Instruction::Label(end_label));
                Ok(())
            }
            (IrKind::Return, []) => {
                self.push(Instruction::PushConst(Constant::Unit));
                self.push(Instruction::Return);
                Ok(())
            }
            (IrKind::Return, [value]) => {
                self.emit_expr(value)?;
                self.push(Instruction::Return);
                Ok(())
            }
            (IrKind::Block, []) => Ok(()),
            (IrKind::Block, stmts) => {
                self.push(Instruction::EnterScope);
                self.emit_stmts(stmts)?;
                self.push(Instruction::ExitScope);
                Ok(())
            }
            _ => Err(malformed(node)),
        }
    }

    pub(crate) fn emit_expr(&mut self, node: &IrNode) -> HelixResult<()> {
        ensure_sufficient_stack(|| self.emit_expr_inner(node))
    }

    fn emit_expr_inner(&mut self, node: &IrNode) -> HelixResult<()> {
        match (&node.kind, node.children.as_slice()) {
            (IrKind::Constant(constant), []) => {
                self.push(Instruction::PushConst(constant.clone()));
            }
            (IrKind::Variable(var), []) => self.push(Instruction::Load(var.name.clone())),
            (IrKind::BinaryOp(op), [left, right]) => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.push(Instruction::Binary(*op));
            }
            (IrKind::UnaryOp(op), [operand]) => {
                self.emit_expr(operand)?;
                self.push(Instruction::Unary(*op));
            }
            (IrKind::Call { callee }, args) => {
                for arg in args {
                    self.emit_expr(arg)?;
                }
                self.push(Instruction::Call {
                    name: callee.name.clone(),
                    argc: args.len(),
                });
            }
            _ => return Err(malformed(node)),
        }
        Ok(())
    }
}

fn malformed(node: &IrNode) -> HelixError {
    let rendered = node.to_string();
    let head = rendered.lines().next().unwrap_or_default().trim();
    HelixError::syntax(
        format!(
            "cannot emit '{head}' with {} child node(s) here",
            node.children.len()
        ),
        node.span(),
    )
}

/// Lowers optimized IR to bytecode.
pub fn compile(root: &IrNode) -> HelixResult<Bytecode> {
    Emitter::new().compile(root)
}
