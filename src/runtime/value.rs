use rustc_hash::FxHashMap;
use serde_json::json;

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::FunctionDecl;
use crate::ir::Constant;
use crate::runtime::environment::EnvRef;
use crate::runtime::print_handler::PrintHandler;
use crate::typechecker::Type;

/// Runtime representation of a collaborator-defined domain value, e.g. a
/// genome sequence. The runtime never looks inside.
pub trait DomainValue: fmt::Debug {
    /// The nominal type name, matching the checker's `Type::Nominal`.
    fn type_name(&self) -> &str;

    fn serialize(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

pub type Deserializer = fn(&str) -> Result<Rc<dyn DomainValue>, String>;

/// Deserializers for domain values, keyed by type name.
#[derive(Debug, Default, Clone)]
pub struct DomainRegistry {
    deserializers: FxHashMap<String, Deserializer>,
}

impl DomainRegistry {
    pub fn register(&mut self, type_name: impl Into<String>, deserializer: Deserializer) {
        self.deserializers.insert(type_name.into(), deserializer);
    }

    pub fn deserialize(&self, type_name: &str, data: &str) -> Result<Rc<dyn DomainValue>, String> {
        let deserialize = self
            .deserializers
            .get(type_name)
            .ok_or_else(|| format!("no deserializer registered for '{type_name}'"))?;
        deserialize(data)
    }
}

pub type NativeFn = Rc<dyn Fn(&PrintHandler, &[Value]) -> Result<Value, String>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub signature: Arc<Type>,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn arity(&self) -> usize {
        match &*self.signature {
            Type::Function { params, .. } => params.len(),
            _ => 0,
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ClosureBody {
    Ast(Rc<FunctionDecl>),
    /// Index of the first body instruction.
    Bytecode { entry: usize },
}

/// A function value: its declaration plus the environment it was defined in.
pub struct Closure {
    pub name: String,
    pub params: Vec<String>,
    pub body: ClosureBody,
    pub env: EnvRef,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Domain(Rc<dyn DomainValue>),
}

impl Value {
    pub fn type_name(&self) -> &str {
        match self {
            Value::Unit => "void",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Domain(value) => value.type_name(),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        Ok(match self {
            Value::Unit => serde_json::Value::Null,
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Bool(b) => json!(b),
            Value::Str(s) => json!(&**s),
            Value::Domain(value) => json!({
                "type": value.type_name(),
                "data": value.serialize(),
            }),
            Value::Function(_) | Value::Native(_) => {
                return Err("function values cannot be serialized".to_string());
            }
        })
    }

    pub fn from_json(json: &serde_json::Value, domains: &DomainRegistry) -> Result<Value, String> {
        match json {
            serde_json::Value::Null => Ok(Value::Unit),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("unsupported number {n}")),
            },
            serde_json::Value::String(s) => Ok(Value::Str(s.as_str().into())),
            serde_json::Value::Object(fields) => {
                let type_name = fields.get("type").and_then(|t| t.as_str());
                let data = fields.get("data").and_then(|d| d.as_str());
                match (type_name, data) {
                    (Some(type_name), Some(data)) => {
                        domains.deserialize(type_name, data).map(Value::Domain)
                    }
                    _ => Err("expected an object with 'type' and 'data'".to_string()),
                }
            }
            serde_json::Value::Array(_) => Err("arrays are not runtime values".to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Domain(a), Value::Domain(b)) => {
                a.type_name() == b.type_name() && a.serialize() == b.serialize()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Function(closure) => write!(f, "<fn {}>", closure.name),
            Value::Native(native) => write!(f, "<native fn {}>", native.name),
            Value::Domain(value) => write!(f, "{}({})", value.type_name(), value.serialize()),
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Unit => Value::Unit,
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(x) => Value::Float(*x),
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Str(s) => Value::Str(s.as_str().into()),
        }
    }
}

impl TryFrom<Value> for Constant {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Value> {
        match value {
            Value::Unit => Ok(Constant::Unit),
            Value::Int(i) => Ok(Constant::Int(i)),
            Value::Float(x) => Ok(Constant::Float(x)),
            Value::Bool(b) => Ok(Constant::Bool(b)),
            Value::Str(s) => Ok(Constant::Str(s.to_string())),
            other => Err(other),
        }
    }
}
