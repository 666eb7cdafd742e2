
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::span::Span;
use crate::typechecker::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: Arc<Type>,
    /// Level of the scope that declared it. Set on insertion.
    pub scope_level: usize,
    pub mutable: bool,
    pub global: bool,
    pub function: bool,
    pub span: Span,
    pub metadata: BTreeMap<String, String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, ty: Arc<Type>) -> Self {
        Symbol {
            name: name.into(),
            ty,
            scope_level: 0,
            mutable: false,
            global: false,
            function: false,
            span: Span::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    pub fn function(mut self) -> Self {
        self.function = true;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolError {
    #[error("'{0}' is already declared in this scope")]
    Duplicate(String),
    #[error("the global scope cannot be exited")]
    GlobalScope,
}

/// One lexical scope. Names are unique within it and keep declaration order.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub level: usize,
    symbols: Vec<Symbol>,
    index: FxHashMap<String, usize>,
}

impl Scope {
    pub fn new(level: usize) -> Self {
        Scope {
            level,
            ..Scope::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&i| &self.symbols[i])
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Stack of scopes; the bottom one is the global scope and is never popped.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::new(0)],
        }
    }

    pub fn enter_scope(&mut self) {
        let level = self.scopes.len();
        trace!(level, "enter scope");
        self.scopes.push(Scope::new(level));
    }

    pub fn exit_scope(&mut self) -> Result<Scope, SymbolError> {
        if self.scopes.len() == 1 {
            return Err(SymbolError::GlobalScope);
        }
        let scope = self.scopes.pop().ok_or(SymbolError::GlobalScope)?;
        trace!(level = scope.level, symbols = scope.len(), "exit scope");
        Ok(scope)
    }

    /// Declares `symbol` in the innermost scope. Shadowing an outer
    /// declaration is fine; redeclaring within the same scope is not.
    pub fn insert(&mut self, mut symbol: Symbol) -> Result<&Symbol, SymbolError> {
        let global = self.scopes.len() == 1;
        let scope = self
            .scopes
            .last_mut()
            .ok_or(SymbolError::GlobalScope)?;
        if scope.index.contains_key(&symbol.name) {
            return Err(SymbolError::Duplicate(symbol.name));
        }

        symbol.scope_level = scope.level;
        symbol.global = global;
        trace!(name = %symbol.name, ty = %symbol.ty, level = scope.level, "declare");

        let slot = scope.symbols.len();
        scope.index.insert(symbol.name.clone(), slot);
        scope.symbols.push(symbol);
        Ok(&scope.symbols[slot])
    }

    /// Innermost declaration of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn lookup_current(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }

    pub fn current_level(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn globals(&self) -> &Scope {
        &self.scopes[0]
    }
}
