use std::sync::Arc;

use super::Type;
use crate::{t_any, t_float};

/// The most general type compatible with both inputs, if there is one.
pub fn unify(a: &Arc<Type>, b: &Arc<Type>) -> Option<Arc<Type>> {
    if a == b {
        return Some(a.clone());
    }

    match (&**a, &**b) {
        (Type::Error, _) => Some(b.clone()),
        (_, Type::Error) => Some(a.clone()),
        (Type::Any, _) | (_, Type::Any) => Some(t_any!()),

        (Type::Int, Type::Float) | (Type::Float, Type::Int) => Some(t_float!()),

        (Type::Array(x), Type::Array(y)) => unify(x, y).map(|elem| Arc::new(Type::Array(elem))),

        (Type::Tuple(xs), Type::Tuple(ys)) if xs.len() == ys.len() => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| unify(x, y))
            .collect::<Option<Vec<_>>>()
            .map(|elems| Arc::new(Type::Tuple(elems))),

        (
            Type::Struct {
                name,
                fields: fields_a,
            },
            Type::Struct {
                fields: fields_b, ..
            },
        ) => {
            if !fields_a.keys().eq(fields_b.keys()) {
                return None;
            }
            let fields = fields_a
                .iter()
                .zip(fields_b.values())
                .map(|((field, x), y)| unify(x, y).map(|ty| (field.clone(), ty)))
                .collect::<Option<_>>()?;
            Some(Arc::new(Type::Struct {
                name: name.clone(),
                fields,
            }))
        }

        (
            Type::Function {
                params: params_a,
                return_type: ret_a,
            },
            Type::Function {
                params: params_b,
                return_type: ret_b,
            },
        ) if params_a.len() == params_b.len() => {
            let params = params_a
                .iter()
                .zip(params_b)
                .map(|(x, y)| unify(x, y))
                .collect::<Option<Vec<_>>>()?;
            let return_type = unify(ret_a, ret_b)?;
            Some(Arc::new(Type::Function {
                params,
                return_type,
            }))
        }

        _ => None,
    }
}
