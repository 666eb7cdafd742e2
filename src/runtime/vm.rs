use tracing::{debug, trace};

use std::rc::Rc;

use crate::codegen::{Bytecode, Instruction, instruction_span};
use crate::errors::{HelixError, HelixResult};
use crate::runtime::frame::CallFrame;
use crate::runtime::interpreter::check_arity;
use crate::runtime::operators;
use crate::runtime::value::{Closure, ClosureBody, Value};
use crate::runtime::Runtime;
use crate::span::Span;

/// Stack machine over a loaded listing. Errors report the failing
/// instruction as line `index + 1`.
pub struct Vm<'rt> {
    rt: &'rt mut Runtime,
    code: &'rt Bytecode,
    ip: usize,
    stack: Vec<Value>,
}

impl<'rt> Vm<'rt> {
    pub fn new(rt: &'rt mut Runtime, code: &'rt Bytecode) -> Self {
        Vm {
            rt,
            code,
            ip: 0,
            stack: vec![],
        }
    }

    /// Runs to the end of the listing. A value left on the stack is the
    /// program's result.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&mut self) -> HelixResult<Value> {
        while self.ip < self.code.len() {
            self.step()?;
        }
        debug!(heap = ?self.rt.heap().stats(), "listing finished");
        Ok(self.stack.pop().unwrap_or(Value::Unit))
    }

    fn pop(&mut self, span: Span) -> HelixResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| HelixError::runtime("operand stack underflow", span))
    }

    fn jump(&mut self, label: &str, span: Span) -> HelixResult<()> {
        self.ip = self
            .code
            .label(label)
            .ok_or_else(|| HelixError::runtime(format!("unknown label '{label}'"), span))?;
        Ok(())
    }

    fn step(&mut self) -> HelixResult<()> {
        let code = self.code;
        let index = self.ip;
        let span = instruction_span(index);
        let Some(instruction) = code.instructions().get(index) else {
            return Err(HelixError::runtime("instruction pointer out of range", span));
        };
        trace!(ip = index, %instruction, depth = self.stack.len(), "step");
        self.ip += 1;

        match instruction {
            Instruction::PushConst(constant) => self.stack.push(Value::from(constant)),
            Instruction::Load(name) => {
                let value = self.rt.lookup(name, span)?;
                self.stack.push(value);
            }
            Instruction::Store(name) => {
                let value = self.pop(span)?;
                self.rt.assign(name, value, span)?;
            }
            Instruction::Declare(name) => {
                let value = self.pop(span)?;
                self.rt.declare(name, value).map_err(|e| e.at(span))?;
            }
            Instruction::Pop => {
                self.pop(span)?;
            }
            Instruction::Binary(op) => {
                let right = self.pop(span)?;
                let left = self.pop(span)?;
                let value = operators::binary(*op, &left, &right)
                    .map_err(|message| HelixError::runtime(message, span))?;
                self.stack.push(value);
            }
            Instruction::Unary(op) => {
                let operand = self.pop(span)?;
                let value = operators::unary(*op, &operand)
                    .map_err(|message| HelixError::runtime(message, span))?;
                self.stack.push(value);
            }
            Instruction::Jump(label) => self.jump(label, span)?,
            Instruction::JumpIfFalse(label) => match self.pop(span)? {
                Value::Bool(true) => {}
                Value::Bool(false) => self.jump(label, span)?,
                other => {
                    return Err(HelixError::runtime(
                        format!("condition must be a bool, found {}", other.type_name()),
                        span,
                    ));
                }
            },
            Instruction::Label(_) => {}
            Instruction::Call { name, argc } => self.call(name, *argc, span)?,
            Instruction::Return => self.ret(span)?,
            Instruction::FuncStart(name) => self.define_function(name, index, span)?,
            Instruction::Param(name) => {
                return Err(HelixError::runtime(
                    format!("PARAM {name} outside a function header"),
                    span,
                ));
            }
            Instruction::FuncEnd => {
                self.stack.push(Value::Unit);
                self.ret(span)?;
            }
            Instruction::EnterScope => self.rt.push_scope(),
            Instruction::ExitScope => self.rt.pop_scope().map_err(|e| e.at(span))?,
        }
        Ok(())
    }

    /// Binds a closure over the current scope and skips past the body.
    fn define_function(&mut self, name: &str, start: usize, span: Span) -> HelixResult<()> {
        let code = self.code;
        let params: Vec<String> = code.instructions()[start + 1..]
            .iter()
            .map_while(|instruction| match instruction {
                Instruction::Param(param) => Some(param.clone()),
                _ => None,
            })
            .collect();
        let end = code.function_end(start).ok_or_else(|| {
            HelixError::runtime(format!("function '{name}' has no FUNC_END"), span)
        })?;
        let closure = Closure {
            name: name.to_string(),
            body: ClosureBody::Bytecode {
                entry: start + 1 + params.len(),
            },
            params,
            env: self.rt.current_env(),
        };
        self.rt
            .declare(name, Value::Function(Rc::new(closure)))
            .map_err(|e| e.at(span))?;
        self.ip = end + 1;
        Ok(())
    }

    fn call(&mut self, name: &str, argc: usize, span: Span) -> HelixResult<()> {
        if self.stack.len() < argc {
            return Err(HelixError::runtime("operand stack underflow", span));
        }
        let args = self.stack.split_off(self.stack.len() - argc);
        match self.rt.lookup(name, span)? {
            Value::Native(native) => {
                check_arity(name, native.arity(), args.len(), span)?;
                let value = (native.func)(self.rt.printer(), &args)
                    .map_err(|message| HelixError::runtime(message, span))?;
                self.stack.push(value);
            }
            Value::Function(closure) => {
                check_arity(name, closure.params.len(), args.len(), span)?;
                let ClosureBody::Bytecode { entry } = closure.body else {
                    return Err(HelixError::runtime(
                        format!("'{name}' has no compiled body"),
                        span,
                    ));
                };
                self.rt.enter_call(
                    CallFrame::new(&closure.name, closure.env.clone())
                        .returning_to(self.ip, self.stack.len())
                        .called_at(span),
                )?;
                for (param, arg) in closure.params.iter().zip(args) {
                    self.rt.declare(param, arg)?;
                }
                self.ip = entry;
            }
            other => {
                return Err(HelixError::runtime(
                    format!("'{name}' is not a function (found {})", other.type_name()),
                    span,
                ));
            }
        }
        Ok(())
    }

    /// Unwinds the current call's scopes and resumes at its call site.
    fn ret(&mut self, span: Span) -> HelixResult<()> {
        let value = self.pop(span)?;
        let frame = self.rt.exit_call().map_err(|e| e.at(span))?;
        let return_ip = frame
            .return_ip
            .ok_or_else(|| HelixError::runtime("frame has no return address", span))?;
        self.stack.truncate(frame.stack_base);
        self.stack.push(value);
        self.ip = return_ip;
        Ok(())
    }
}
