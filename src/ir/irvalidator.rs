use rustc_hash::{FxHashMap, FxHashSet};

use super::*;
use crate::stack::ensure_sufficient_stack;

/// Structural checks over lowered IR: child counts, references to declared
/// variables, assignment to immutable bindings, returns outside functions
/// and call arity for functions defined in the tree.
#[derive(Debug, Default)]
pub struct IRValidator {
    externals: FxHashSet<String>,
}

struct Walk<'a> {
    externals: &'a FxHashSet<String>,
    scopes: Vec<FxHashSet<usize>>,
    arities: FxHashMap<usize, usize>,
    function_depth: usize,
    errors: Vec<String>,
}

impl IRValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_externals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.externals.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self, root: &IrNode) -> Result<(), Vec<String>> {
        let mut walk = Walk {
            externals: &self.externals,
            scopes: vec![FxHashSet::default()],
            arities: FxHashMap::default(),
            function_depth: 0,
            errors: vec![],
        };
        walk.body(&root.children);

        if walk.errors.is_empty() {
            Ok(())
        } else {
            Err(walk.errors)
        }
    }
}

impl Walk<'_> {
    fn error(&mut self, node: &IrNode, message: String) {
        self.errors.push(format!("{}: {message}", node.span()));
    }

    fn declare(&mut self, var: &IrVar) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(var.id);
        }
    }

    fn check_ref(&mut self, node: &IrNode, var: &IrVar) {
        let declared = self.scopes.iter().any(|scope| scope.contains(&var.id));
        if !declared && !self.externals.contains(&var.name) {
            self.error(node, format!("'{}#{}' is used outside its scope", var.name, var.id));
        }
    }

    /// Functions in a body are visible to every statement in it.
    fn body(&mut self, children: &[IrNode]) {
        for child in children {
            if let IrKind::Function { var, params } = &child.kind {
                self.declare(var);
                self.arities.insert(var.id, params.len());
            }
        }
        for child in children {
            self.node(child);
        }
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(FxHashSet::default());
        f(self);
        self.scopes.pop();
    }

    fn arity(&mut self, node: &IrNode, expected: usize) {
        if node.children.len() != expected {
            self.error(
                node,
                format!("expected {expected} children, found {}", node.children.len()),
            );
        }
    }

    fn node(&mut self, node: &IrNode) {
        ensure_sufficient_stack(|| self.node_inner(node))
    }

    fn node_inner(&mut self, node: &IrNode) {
        match &node.kind {
            IrKind::Function { params, .. } => {
                self.function_depth += 1;
                self.scoped(|walk| {
                    for param in params {
                        walk.declare(param);
                    }
                    walk.body(&node.children);
                });
                self.function_depth -= 1;
            }
            IrKind::Block => self.scoped(|walk| walk.body(&node.children)),
            IrKind::Variable(var) => {
                self.arity(node, 0);
                self.check_ref(node, var);
            }
            IrKind::Assignment { target, declare } => {
                self.arity(node, 1);
                self.children(node);
                if *declare {
                    self.declare(target);
                } else {
                    self.check_ref(node, target);
                    if !target.mutable {
                        self.error(node, format!("'{}' is immutable", target.name));
                    }
                }
            }
            IrKind::If => {
                self.arity(node, 3);
                self.children(node);
            }
            IrKind::While | IrKind::BinaryOp(_) => {
                self.arity(node, 2);
                self.children(node);
            }
            IrKind::UnaryOp(_) => {
                self.arity(node, 1);
                self.children(node);
            }
            IrKind::Call { callee } => {
                self.check_ref(node, callee);
                if let Some(&expected) = self.arities.get(&callee.id) {
                    if expected != node.children.len() {
                        self.error(
                            node,
                            format!(
                                "'{}' takes {expected} argument(s), called with {}",
                                callee.name,
                                node.children.len()
                            ),
                        );
                    }
                }
                self.children(node);
            }
            IrKind::Return => {
                if self.function_depth == 0 {
                    self.error(node, "return outside of a function".to_string());
                }
                if node.children.len() > 1 {
                    self.arity(node, 1);
                }
                self.children(node);
            }
            IrKind::Constant(_) => self.arity(node, 0),
        }
    }

    fn children(&mut self, node: &IrNode) {
        for child in &node.children {
            self.node(child);
        }
    }
}
