use tracing::{error, info, warn};

use crate::runtime::Value;
use crate::stdlib::{Natives, expect_str};
use crate::{t_any, t_fn, t_string, t_void};

pub fn add_io_functions(natives: &mut Natives) {
    // print(value: any)
    natives.insert("print", t_fn!([t_any!()] -> t_void!()), |out, args| {
        out.println(&args[0].to_string());
        Ok(Value::Unit)
    });

    // str(value: any) -> string
    natives.insert("str", t_fn!([t_any!()] -> t_string!()), |_, args| {
        Ok(Value::Str(args[0].to_string().into()))
    });

    // log_info(message: string), log_warn, log_error
    natives.insert("log_info", t_fn!([t_string!()] -> t_void!()), |_, args| {
        info!(target: "helix::program", "{}", expect_str(&args[0], "log_info")?);
        Ok(Value::Unit)
    });
    natives.insert("log_warn", t_fn!([t_string!()] -> t_void!()), |_, args| {
        warn!(target: "helix::program", "{}", expect_str(&args[0], "log_warn")?);
        Ok(Value::Unit)
    });
    natives.insert("log_error", t_fn!([t_string!()] -> t_void!()), |_, args| {
        error!(target: "helix::program", "{}", expect_str(&args[0], "log_error")?);
        Ok(Value::Unit)
    });
}
