//! Operator semantics over runtime values. Shared by both execution modes
//! and by constant folding, so folded and executed results always agree.

use std::cmp::Ordering;

use crate::ast::{BinOp, UnOp};
use crate::runtime::value::Value;

pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, String> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            arithmetic(op, left, right)
        }
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::NotEq => Ok(Value::Bool(left != right)),
        BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => {
            let ordering = compare(left, right).ok_or_else(|| mismatch(op, left, right))?;
            Ok(Value::Bool(match op {
                BinOp::Less => ordering == Ordering::Less,
                BinOp::LessEq => ordering != Ordering::Greater,
                BinOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinOp::And | BinOp::Or => match (left, right) {
            (Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(if op == BinOp::And {
                *l && *r
            } else {
                *l || *r
            })),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

pub fn unary(op: UnOp, operand: &Value) -> Result<Value, String> {
    match (op, operand) {
        (UnOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow in negation".to_string()),
        (UnOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => Err(format!(
            "cannot apply '{op}' to a value of type {}",
            operand.type_name()
        )),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => {
            if matches!(op, BinOp::Div | BinOp::Mod) && *r == 0 {
                return Err(zero_divisor(op));
            }
            let result = match op {
                BinOp::Add => l.checked_add(*r),
                BinOp::Sub => l.checked_sub(*r),
                BinOp::Mul => l.checked_mul(*r),
                BinOp::Div => l.checked_div(*r),
                _ => l.checked_rem(*r),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| format!("integer overflow in {l} {op} {r}"))
        }
        (Value::Str(l), Value::Str(r)) if op == BinOp::Add => {
            Ok(Value::Str(format!("{l}{r}").into()))
        }
        _ => {
            let (Some(l), Some(r)) = (as_float(left), as_float(right)) else {
                return Err(mismatch(op, left, right));
            };
            if matches!(op, BinOp::Div | BinOp::Mod) && r == 0.0 {
                return Err(zero_divisor(op));
            }
            Ok(Value::Float(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
                _ => l % r,
            }))
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Some(l.cmp(r)),
        (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
        _ => as_float(left)?.partial_cmp(&as_float(right)?),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn zero_divisor(op: BinOp) -> String {
    match op {
        BinOp::Mod => "modulo by zero".to_string(),
        _ => "division by zero".to_string(),
    }
}

fn mismatch(op: BinOp, left: &Value, right: &Value) -> String {
    format!(
        "unsupported operand types for '{op}': {} and {}",
        left.type_name(),
        right.type_name()
    )
}
