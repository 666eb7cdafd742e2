pub mod expression;
pub mod statement;


use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use std::ops::Deref;
use std::sync::Arc;

use crate::ast::{Program, TypeAnnot};
use crate::errors::HelixError;
use crate::span::Span;
use crate::symbols::{Symbol, SymbolError, SymbolTable};
use crate::typechecker::{DOMAIN_TYPES, Type};
use crate::{t_any, t_bool, t_error, t_float, t_int, t_string, t_void};

/// A program that passed validation. Later stages only accept this.
#[derive(Debug, Clone)]
pub struct ValidatedProgram {
    program: Program,
    exports: Vec<Symbol>,
}

impl ValidatedProgram {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Top-level symbols this program declared itself.
    pub fn exports(&self) -> &[Symbol] {
        &self.exports
    }
}

impl Deref for ValidatedProgram {
    type Target = Program;

    fn deref(&self) -> &Program {
        &self.program
    }
}

/// Scope and type checker. Errors are collected, not thrown, so one run
/// reports every independent problem.
pub struct Validator {
    symbols: SymbolTable,
    structs: FxHashMap<String, Arc<Type>>,
    nominal_types: FxHashSet<String>,
    modules: FxHashSet<String>,
    signatures: FxHashMap<Span, Arc<Type>>,
    return_types: Vec<Arc<Type>>,
    /// Declaring scope level and name of each function being checked.
    functions: Vec<(usize, String)>,
    /// Per scope level: outer names that a function declared in that scope
    /// reads, mapped to the reading function.
    captured: Vec<FxHashMap<String, String>>,
    errors: Vec<HelixError>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(SymbolTable::new())
    }
}

impl Validator {
    /// `prelude` holds natives and injected library symbols.
    pub fn new(prelude: SymbolTable) -> Self {
        let levels = prelude.current_level() + 1;
        Validator {
            symbols: prelude,
            structs: FxHashMap::default(),
            nominal_types: DOMAIN_TYPES.iter().map(|name| name.to_string()).collect(),
            modules: FxHashSet::default(),
            signatures: FxHashMap::default(),
            return_types: vec![],
            functions: vec![],
            captured: vec![FxHashMap::default(); levels],
            errors: vec![],
        }
    }

    pub fn with_modules(mut self, modules: impl IntoIterator<Item = String>) -> Self {
        self.modules.extend(modules);
        self
    }

    pub fn with_nominal_types(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.nominal_types.extend(names);
        self
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn validate(mut self, program: Program) -> Result<ValidatedProgram, Vec<HelixError>> {
        let prelude_len = self.symbols.globals().len();
        self.check_block(&program.statements);

        if !self.errors.is_empty() {
            debug!(errors = self.errors.len(), "validation failed");
            return Err(self.errors);
        }

        let exports = self
            .symbols
            .globals()
            .symbols()
            .skip(prelude_len)
            .cloned()
            .collect();
        Ok(ValidatedProgram { program, exports })
    }

    pub(crate) fn error(&mut self, error: HelixError) {
        self.errors.push(error);
    }

    pub(crate) fn type_error(&mut self, message: impl Into<String>, span: Span) {
        self.error(HelixError::type_error(message, span));
    }

    pub(crate) fn declare(&mut self, symbol: Symbol) {
        let span = symbol.span;
        let level = self.symbols.current_level();
        if let Some(function) = self.captured.get(level).and_then(|names| names.get(&symbol.name)) {
            let message = format!(
                "'{}' would shadow the outer binding that function '{function}' already reads",
                symbol.name
            );
            self.type_error(message, span);
        }
        if let Err(SymbolError::Duplicate(name)) = self.symbols.insert(symbol) {
            self.type_error(format!("'{name}' is already declared in this scope"), span);
        }
    }

    pub(crate) fn enter_scope(&mut self) {
        self.symbols.enter_scope();
        self.captured.push(FxHashMap::default());
    }

    pub(crate) fn exit_scope(&mut self) {
        let exited = self.symbols.exit_scope();
        debug_assert!(exited.is_ok(), "scope stack out of balance");
        self.captured.pop();
    }

    /// Records that `name` resolved to a declaration at `level`. A function
    /// reading a name from outside the scope it is declared in keeps reading
    /// through that scope at runtime, so the scope may not redeclare it later.
    pub(crate) fn note_reference(&mut self, name: &str, level: usize) {
        for (declared_in, function) in &self.functions {
            if level < *declared_in {
                if let Some(names) = self.captured.get_mut(*declared_in) {
                    names
                        .entry(name.to_string())
                        .or_insert_with(|| function.clone());
                }
            }
        }
    }

    pub(crate) fn resolve_annot(&mut self, annot: &TypeAnnot, span: Span) -> Arc<Type> {
        match annot {
            TypeAnnot::Named(name) => match name.as_str() {
                "int" => t_int!(),
                "float" => t_float!(),
                "bool" => t_bool!(),
                "string" => t_string!(),
                "void" => t_void!(),
                "any" => t_any!(),
                _ if self.nominal_types.contains(name) => Arc::new(Type::Nominal(name.clone())),
                _ => match self.structs.get(name) {
                    Some(ty) => ty.clone(),
                    None => {
                        self.type_error(format!("unknown type '{name}'"), span);
                        t_error!()
                    }
                },
            },
            TypeAnnot::Array(elem) => Arc::new(Type::Array(self.resolve_annot(elem, span))),
            TypeAnnot::Tuple(elems) => Arc::new(Type::Tuple(
                elems.iter().map(|e| self.resolve_annot(e, span)).collect(),
            )),
            TypeAnnot::Function {
                params,
                return_type,
            } => Arc::new(Type::Function {
                params: params.iter().map(|p| self.resolve_annot(p, span)).collect(),
                return_type: self.resolve_annot(return_type, span),
            }),
        }
    }
}

/// Validates `program` against an empty prelude.
pub fn validate(program: Program) -> Result<ValidatedProgram, Vec<HelixError>> {
    Validator::default().validate(program)
}
