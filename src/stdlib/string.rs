use crate::runtime::Value;
use crate::stdlib::{Natives, expect_int, expect_str};
use crate::{t_fn, t_int, t_string};

pub fn add_string_functions(natives: &mut Natives) {
    // len(s: string) -> int, counted in characters
    natives.insert("len", t_fn!([t_string!()] -> t_int!()), |_, args| {
        let s = expect_str(&args[0], "len")?;
        Ok(Value::Int(s.chars().count() as i64))
    });

    // upper(s: string) -> string
    natives.insert("upper", t_fn!([t_string!()] -> t_string!()), |_, args| {
        Ok(Value::Str(expect_str(&args[0], "upper")?.to_uppercase().into()))
    });

    // lower(s: string) -> string
    natives.insert("lower", t_fn!([t_string!()] -> t_string!()), |_, args| {
        Ok(Value::Str(expect_str(&args[0], "lower")?.to_lowercase().into()))
    });

    // substring(s: string, start: int, length: int) -> string
    natives.insert(
        "substring",
        t_fn!([t_string!(), t_int!(), t_int!()] -> t_string!()),
        |_, args| {
            let s = expect_str(&args[0], "substring")?;
            let start = expect_int(&args[1], "substring")?;
            let length = expect_int(&args[2], "substring")?;
            let count = s.chars().count() as i64;
            if start < 0 || start >= count {
                return Err(format!("start index {start} out of range for length {count}"));
            }
            if length < 0 {
                return Err(format!("length cannot be negative, got {length}"));
            }
            let taken: String = s
                .chars()
                .skip(start as usize)
                .take(length as usize)
                .collect();
            Ok(Value::Str(taken.into()))
        },
    );
}
