use crate::runtime::Value;
use crate::stdlib::{Natives, expect_float, expect_int};
use crate::{t_float, t_fn, t_int};

pub fn add_math_functions(natives: &mut Natives) {
    // abs(x: int) -> int
    natives.insert("abs", t_fn!([t_int!()] -> t_int!()), |_, args| {
        let x = expect_int(&args[0], "abs")?;
        x.checked_abs()
            .map(Value::Int)
            .ok_or_else(|| format!("integer overflow in abs({x})"))
    });

    // sqrt(x: float) -> float
    natives.insert("sqrt", t_fn!([t_float!()] -> t_float!()), |_, args| {
        let x = expect_float(&args[0], "sqrt")?;
        if x < 0.0 {
            return Err(format!("cannot take the square root of negative number {x}"));
        }
        Ok(Value::Float(x.sqrt()))
    });

    // pow(base: float, exponent: float) -> float
    natives.insert(
        "pow",
        t_fn!([t_float!(), t_float!()] -> t_float!()),
        |_, args| {
            let base = expect_float(&args[0], "pow")?;
            let exponent = expect_float(&args[1], "pow")?;
            Ok(Value::Float(base.powf(exponent)))
        },
    );

    // float(x: int) -> float
    natives.insert("float", t_fn!([t_int!()] -> t_float!()), |_, args| {
        Ok(Value::Float(expect_int(&args[0], "float")? as f64))
    });

    // int(x: float) -> int, truncating toward zero
    natives.insert("int", t_fn!([t_float!()] -> t_int!()), |_, args| {
        let x = expect_float(&args[0], "int")?;
        if !x.is_finite() || x >= i64::MAX as f64 || x < i64::MIN as f64 {
            return Err(format!("{x} does not fit in an int"));
        }
        Ok(Value::Int(x.trunc() as i64))
    });
}
