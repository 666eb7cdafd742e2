use crate::runtime::environment::EnvRef;
use crate::span::Span;

/// One active call. The bottom frame is the program itself.
#[derive(Debug)]
pub struct CallFrame {
    pub function: String,
    /// Innermost scope of this call.
    pub env: EnvRef,
    /// Scopes pushed since the frame began. Unwound on return.
    pub scopes: usize,
    /// Where the VM resumes after `RETURN`.
    pub return_ip: Option<usize>,
    /// Operand stack height at call time.
    pub stack_base: usize,
    pub call_site: Span,
}

impl CallFrame {
    pub fn new(function: impl Into<String>, env: EnvRef) -> Self {
        CallFrame {
            function: function.into(),
            env,
            scopes: 0,
            return_ip: None,
            stack_base: 0,
            call_site: Span::default(),
        }
    }

    pub fn returning_to(mut self, ip: usize, stack_base: usize) -> Self {
        self.return_ip = Some(ip);
        self.stack_base = stack_base;
        self
    }

    pub fn called_at(mut self, span: Span) -> Self {
        self.call_site = span;
        self
    }
}
