pub mod domain;
pub mod io;
pub mod loader;
pub mod math;
pub mod string;

#[cfg(test)]
pub mod test;

use std::rc::Rc;
use std::sync::Arc;

use crate::errors::HelixResult;
use crate::runtime::value::NativeFn;
use crate::runtime::{NativeFunction, PrintHandler, Runtime, Value};
use crate::symbols::{Symbol, SymbolTable};
use crate::typechecker::Type;

pub use domain::{Sequence, SequenceKind};
pub use loader::{Library, StdlibLoader};

/// Native functions known to a session: a signature for the validator and
/// an implementation for the runtime.
#[derive(Clone, Default)]
pub struct Natives {
    functions: Vec<NativeFunction>,
}

impl Natives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in native.
    pub fn standard() -> Self {
        let mut natives = Self::new();
        io::add_io_functions(&mut natives);
        math::add_math_functions(&mut natives);
        string::add_string_functions(&mut natives);
        domain::add_domain_functions(&mut natives);
        natives
    }

    /// Registers a native, replacing any earlier one with the same name.
    pub fn insert<F>(&mut self, name: &str, signature: Arc<Type>, func: F)
    where
        F: Fn(&PrintHandler, &[Value]) -> Result<Value, String> + 'static,
    {
        let func: NativeFn = Rc::new(func);
        self.functions.retain(|native| native.name != name);
        self.functions.push(NativeFunction {
            name: name.to_string(),
            signature,
            func,
        });
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.iter().find(|native| native.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|native| native.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// A symbol table whose global scope holds every native's signature.
    pub fn prelude(&self) -> SymbolTable {
        let mut table = SymbolTable::new();
        for native in &self.functions {
            let symbol = Symbol::new(&native.name, native.signature.clone())
                .function()
                .with_metadata("native", "true");
            // Names are unique, so insertion cannot collide.
            let _ = table.insert(symbol);
        }
        table
    }

    /// Binds every native in the runtime's global environment.
    pub fn install(&self, rt: &mut Runtime) -> HelixResult<()> {
        for native in &self.functions {
            rt.define_native(native.clone())?;
        }
        Ok(())
    }
}

pub(crate) fn expect_int(value: &Value, what: &str) -> Result<i64, String> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(format!("{what} expects an int, found {}", other.type_name())),
    }
}

pub(crate) fn expect_float(value: &Value, what: &str) -> Result<f64, String> {
    match value {
        Value::Float(x) => Ok(*x),
        Value::Int(i) => Ok(*i as f64),
        other => Err(format!("{what} expects a float, found {}", other.type_name())),
    }
}

pub(crate) fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, String> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(format!("{what} expects a string, found {}", other.type_name())),
    }
}
