pub mod subtype;
pub mod unify;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use subtype::is_subtype;
pub use unify::unify;

/// Domain types every session knows about. Opaque, compared by name only.
pub const DOMAIN_TYPES: [&str; 3] = ["genome", "protein", "cell"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    /// Result of functions that return nothing.
    Void,
    /// Top type, only reachable through native signatures.
    Any,
    /// Placeholder after a reported error. Compatible with everything so a
    /// single mistake produces a single diagnostic.
    Error,
    Nominal(String),
    Array(Arc<Type>),
    Tuple(Vec<Arc<Type>>),
    Struct {
        name: String,
        fields: BTreeMap<String, Arc<Type>>,
    },
    Function {
        params: Vec<Arc<Type>>,
        return_type: Arc<Type>,
    },
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Bool => f.write_str("bool"),
            Type::String => f.write_str("string"),
            Type::Void => f.write_str("void"),
            Type::Any => f.write_str("any"),
            Type::Error => f.write_str("<error>"),
            Type::Nominal(name) => f.write_str(name),
            Type::Array(elem) => write!(f, "[{elem}]"),
            Type::Tuple(elems) => {
                let parts: Vec<String> = elems.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
            Type::Struct { name, fields } => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(field, ty)| format!("{field}: {ty}"))
                    .collect();
                write!(f, "struct {name} {{ {} }}", parts.join(", "))
            }
            Type::Function {
                params,
                return_type,
            } => {
                let parts: Vec<String> = params.iter().map(|t| t.to_string()).collect();
                write!(f, "fn({}) -> {return_type}", parts.join(", "))
            }
        }
    }
}

#[macro_export]
macro_rules! t_int {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Int)
    };
}

#[macro_export]
macro_rules! t_float {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Float)
    };
}

#[macro_export]
macro_rules! t_bool {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Bool)
    };
}

#[macro_export]
macro_rules! t_string {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::String)
    };
}

#[macro_export]
macro_rules! t_void {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Void)
    };
}

#[macro_export]
macro_rules! t_any {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Any)
    };
}

#[macro_export]
macro_rules! t_error {
    () => {
        ::std::sync::Arc::new($crate::typechecker::Type::Error)
    };
}

#[macro_export]
macro_rules! t_nominal {
    ($name: expr) => {
        ::std::sync::Arc::new($crate::typechecker::Type::Nominal($name.to_string()))
    };
}

#[macro_export]
macro_rules! t_array {
    ($elem: expr) => {
        ::std::sync::Arc::new($crate::typechecker::Type::Array($elem))
    };
}

#[macro_export]
macro_rules! t_fn {
    ([$($param: expr),* $(,)?] -> $ret: expr) => {
        ::std::sync::Arc::new($crate::typechecker::Type::Function {
            params: vec![$($param),*],
            return_type: $ret,
        })
    };
}

/// Builds a struct type from `(field, type)` pairs.
pub fn struct_type(
    name: &str,
    fields: impl IntoIterator<Item = (String, Arc<Type>)>,
) -> Arc<Type> {
    Arc::new(Type::Struct {
        name: name.to_string(),
        fields: fields.into_iter().collect(),
    })
}
