use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::ast::{BinOp, UnOp};
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;

pub mod builder;
pub mod irvalidator;
pub mod optimizer;

#[cfg(test)]
pub mod test;

pub use builder::IRBuilder;
pub use irvalidator::IRValidator;
pub use optimizer::{ConstantFolding, DeadCodeElimination, Optimizer, Pass};

/// A declaration site. Every `Variable`, `Assignment` and `Call` points at
/// the one that introduced its name, so later stages never look names up.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct IrVar {
    pub id: usize,
    pub name: String,
    pub mutable: bool,
}

pub type VarRef = Rc<IrVar>;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrKind {
    /// Children are the body statements.
    Function { var: VarRef, params: Vec<VarRef> },
    Variable(VarRef),
    /// Children: `[value]`. `declare` introduces the binding.
    Assignment { target: VarRef, declare: bool },
    /// Children: `[condition, then, else]`. An absent else is an empty block.
    If,
    /// Children: `[condition, body]`.
    While,
    /// Children are the arguments.
    Call { callee: VarRef },
    /// Children: `[]` or `[value]`.
    Return,
    Constant(Constant),
    /// Children: `[left, right]`.
    BinaryOp(BinOp),
    /// Children: `[operand]`.
    UnaryOp(UnOp),
    Block,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub span: Span,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    pub kind: IrKind,
    pub children: Vec<IrNode>,
    pub metadata: Metadata,
}

impl IrNode {
    pub fn new(kind: IrKind, children: Vec<IrNode>, span: Span) -> Self {
        IrNode {
            kind,
            children,
            metadata: Metadata {
                span,
                annotations: BTreeMap::new(),
            },
        }
    }

    pub fn constant(constant: Constant, span: Span) -> Self {
        IrNode::new(IrKind::Constant(constant), vec![], span)
    }

    pub fn block(children: Vec<IrNode>, span: Span) -> Self {
        IrNode::new(IrKind::Block, children, span)
    }

    pub fn span(&self) -> Span {
        self.metadata.span
    }

    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            IrKind::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    /// Whether the node yields a value, as opposed to a statement.
    pub fn is_expression(&self) -> bool {
        matches!(
            self.kind,
            IrKind::Variable(_)
                | IrKind::Call { .. }
                | IrKind::Constant(_)
                | IrKind::BinaryOp(_)
                | IrKind::UnaryOp(_)
        )
    }

    /// Post-order rewrite: children first, then `f` on the rebuilt node.
    pub fn transform(self, f: &mut impl FnMut(IrNode) -> IrNode) -> IrNode {
        let IrNode {
            kind,
            children,
            metadata,
        } = self;
        let children: Vec<IrNode> = ensure_sufficient_stack(|| {
            children.into_iter().map(|c| c.transform(f)).collect()
        });
        f(IrNode {
            kind,
            children,
            metadata,
        })
    }

    /// Pre-order visit.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a IrNode)) {
        f(self);
        ensure_sufficient_stack(|| {
            for child in &self.children {
                child.walk(f);
            }
        });
    }

    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        match &self.kind {
            IrKind::Function { var, params } => {
                let params: Vec<String> = params.iter().map(|p| var_label(p)).collect();
                write!(f, "function {}({})", var_label(var), params.join(", "))?
            }
            IrKind::Variable(var) => write!(f, "variable {}", var_label(var))?,
            IrKind::Assignment { target, declare } => {
                let verb = if *declare { "declare" } else { "assign" };
                write!(f, "{verb} {}", var_label(target))?
            }
            IrKind::If => f.write_str("if")?,
            IrKind::While => f.write_str("while")?,
            IrKind::Call { callee } => write!(f, "call {}", var_label(callee))?,
            IrKind::Return => f.write_str("return")?,
            IrKind::Constant(constant) => write!(f, "const {constant}")?,
            IrKind::BinaryOp(op) => write!(f, "binary {op}")?,
            IrKind::UnaryOp(op) => write!(f, "unary {op}")?,
            IrKind::Block => f.write_str("block")?,
        }
        for (key, value) in &self.metadata.annotations {
            write!(f, " [{key}={value}]")?;
        }
        writeln!(f)?;
        ensure_sufficient_stack(|| {
            self.children
                .iter()
                .try_for_each(|child| child.fmt_indented(f, depth + 1))
        })
    }
}

fn var_label(var: &IrVar) -> String {
    format!("{}#{}", var.name, var.id)
}

impl Display for IrNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Bytecode spelling, also used when dumping IR.
impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Unit => f.write_str("()"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        '\r' => f.write_str("\\r")?,
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}
