use tracing::{debug, trace};

use super::*;
use crate::runtime::operators;
use crate::runtime::value::Value;

/// A pure tree-to-tree rewrite.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, ir: IrNode) -> IrNode;
}

/// Ordered list of passes, run once each per `optimize` call.
pub struct Optimizer {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::standard()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer { passes: vec![] }
    }

    /// Constant folding followed by dead-code elimination.
    pub fn standard() -> Self {
        Self::new()
            .with_pass(ConstantFolding)
            .with_pass(DeadCodeElimination)
    }

    /// 0 disables optimization, 1 folds constants only, anything higher runs
    /// the standard pipeline.
    pub fn for_level(level: u8) -> Self {
        match level {
            0 => Self::new(),
            1 => Self::new().with_pass(ConstantFolding),
            _ => Self::standard(),
        }
    }

    pub fn with_pass(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn optimize(&self, mut ir: IrNode) -> IrNode {
        for pass in &self.passes {
            let before = ir.count();
            ir = pass.run(ir);
            debug!(pass = pass.name(), before, after = ir.count(), "ran pass");
        }
        ir
    }
}

/// Replaces operators over constant operands with their result.
///
/// Division and modulo by a constant zero stay unfolded so the fault
/// surfaces when the program runs. Any other evaluation failure, such as
/// overflow, also leaves the node alone.
pub struct ConstantFolding;

impl ConstantFolding {
    fn fold(node: IrNode) -> IrNode {
        let folded = match (&node.kind, node.children.as_slice()) {
            (IrKind::BinaryOp(op), [left, right]) => {
                match (left.as_constant(), right.as_constant()) {
                    (Some(_), Some(Constant::Int(0)))
                        if matches!(op, BinOp::Div | BinOp::Mod) =>
                    {
                        None
                    }
                    (Some(_), Some(Constant::Float(x)))
                        if *x == 0.0 && matches!(op, BinOp::Div | BinOp::Mod) =>
                    {
                        None
                    }
                    (Some(l), Some(r)) => {
                        operators::binary(*op, &Value::from(l), &Value::from(r)).map_err(|e| {
                            trace!(error = %e, "fold skipped");
                        })
                        .ok()
                    }
                    _ => None,
                }
            }
            (IrKind::UnaryOp(op), [operand]) => operand.as_constant().and_then(|c| {
                operators::unary(*op, &Value::from(c))
                    .map_err(|e| trace!(error = %e, "fold skipped"))
                    .ok()
            }),
            _ => None,
        };

        match folded.and_then(|value| Constant::try_from(value).ok()) {
            Some(constant) => IrNode::constant(constant, node.span()),
            None => node,
        }
    }
}

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, ir: IrNode) -> IrNode {
        ir.transform(&mut Self::fold)
    }
}

/// Drops statements after an unconditional return, and branches and loops
/// whose condition is a constant.
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    fn eliminate(mut node: IrNode) -> IrNode {
        let condition = match node.children.first().and_then(IrNode::as_constant) {
            Some(Constant::Bool(b)) => Some(*b),
            _ => None,
        };
        let is_body = matches!(node.kind, IrKind::Block | IrKind::Function { .. });
        let is_if = node.kind == IrKind::If;
        let is_while = node.kind == IrKind::While;
        match condition {
            _ if is_body => {
                if let Some(ret) = node
                    .children
                    .iter()
                    .position(|child| child.kind == IrKind::Return)
                {
                    node.children.truncate(ret + 1);
                }
                node
            }
            Some(cond) if is_if => {
                let span = node.span();
                let index = if cond { 1 } else { 2 };
                node.children
                    .into_iter()
                    .nth(index)
                    .unwrap_or_else(|| IrNode::block(vec![], span))
            }
            Some(false) if is_while => IrNode::block(vec![], node.span()),
            _ => node,
        }
    }
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, ir: IrNode) -> IrNode {
        ir.transform(&mut Self::eliminate)
    }
}
