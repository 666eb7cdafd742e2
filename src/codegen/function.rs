use crate::codegen::{Emitter, Instruction};
use crate::errors::HelixResult;
use crate::ir::{IrNode, VarRef};

impl Emitter {
    /// `FUNC_START`, one `PARAM` per parameter, the body, `FUNC_END`.
    /// Falling through to `FUNC_END` returns unit.
    pub(crate) fn emit_function(
        &mut self,
        var: &VarRef,
        params: &[VarRef],
        body: &[IrNode],
    ) -> HelixResult<()> {
        self.push(Instruction::FuncStart(var.name.clone()));
        for param in params {
            self.push(Instruction::Param(param.name.clone()));
        }
        self.emit_stmts(body)?;
        self.push(Instruction::FuncEnd);
        Ok(())
    }
}
