use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use thiserror::Error;

use std::fmt;
use std::ops::Range;

use crate::span::Span;

pub type HelixResult<T> = Result<T, HelixError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Type,
    Mutation,
    Runtime,
    Memory,
    Load,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "HLX_SYNTAX_ERR",
            ErrorKind::Type => "HLX_TYPE_ERR",
            ErrorKind::Mutation => "HLX_MUTATION_ERR",
            ErrorKind::Runtime => "HLX_RUNTIME_ERR",
            ErrorKind::Memory => "HLX_MEMORY_ERR",
            ErrorKind::Load => "HLX_LOAD_ERR",
        }
    }

    pub fn hint(self) -> Option<&'static str> {
        match self {
            ErrorKind::Syntax => Some("check syntax near the indicated location"),
            ErrorKind::Type => Some("ensure type compatibility and correctness"),
            ErrorKind::Mutation => Some("declare the binding with `var` to allow reassignment"),
            ErrorKind::Load => Some("library modules must not redefine existing names"),
            ErrorKind::Runtime | ErrorKind::Memory => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Type => "type error",
            ErrorKind::Mutation => "mutation error",
            ErrorKind::Runtime => "runtime error",
            ErrorKind::Memory => "memory error",
            ErrorKind::Load => "load error",
        };
        f.write_str(name)
    }
}

/// Every failure the pipeline can report. Each variant carries the source
/// location it was raised at.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HelixError {
    #[error("syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    #[error("type error at {span}: {message}")]
    Type { message: String, span: Span },

    #[error("mutation error at {span}: {message}")]
    Mutation { message: String, span: Span },

    #[error("runtime error at {span}: {message}")]
    Runtime { message: String, span: Span },

    /// Heap invariant violation. Never recoverable by user code.
    #[error("memory error at {span}: {message}")]
    Memory { message: String, span: Span },

    #[error("load error in module `{module}` at {span}: {message}")]
    Load {
        module: String,
        message: String,
        span: Span,
    },
}

impl HelixError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        HelixError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        HelixError::Type {
            message: message.into(),
            span,
        }
    }

    pub fn mutation(message: impl Into<String>, span: Span) -> Self {
        HelixError::Mutation {
            message: message.into(),
            span,
        }
    }

    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        HelixError::Runtime {
            message: message.into(),
            span,
        }
    }

    pub fn memory(message: impl Into<String>, span: Span) -> Self {
        HelixError::Memory {
            message: message.into(),
            span,
        }
    }

    pub fn load(module: impl Into<String>, message: impl Into<String>, span: Span) -> Self {
        HelixError::Load {
            module: module.into(),
            message: message.into(),
            span,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HelixError::Syntax { .. } => ErrorKind::Syntax,
            HelixError::Type { .. } => ErrorKind::Type,
            HelixError::Mutation { .. } => ErrorKind::Mutation,
            HelixError::Runtime { .. } => ErrorKind::Runtime,
            HelixError::Memory { .. } => ErrorKind::Memory,
            HelixError::Load { .. } => ErrorKind::Load,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            HelixError::Syntax { span, .. }
            | HelixError::Type { span, .. }
            | HelixError::Mutation { span, .. }
            | HelixError::Runtime { span, .. }
            | HelixError::Memory { span, .. }
            | HelixError::Load { span, .. } => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HelixError::Syntax { message, .. }
            | HelixError::Type { message, .. }
            | HelixError::Mutation { message, .. }
            | HelixError::Runtime { message, .. }
            | HelixError::Memory { message, .. }
            | HelixError::Load { message, .. } => message,
        }
    }

    /// Re-anchors an error raised without a useful location.
    pub fn at(mut self, new_span: Span) -> Self {
        match &mut self {
            HelixError::Syntax { span, .. }
            | HelixError::Type { span, .. }
            | HelixError::Mutation { span, .. }
            | HelixError::Runtime { span, .. }
            | HelixError::Memory { span, .. }
            | HelixError::Load { span, .. } => *span = new_span,
        }
        self
    }

    fn build_report(&self, file: &str, colored: bool) -> Report<'static, (String, Range<usize>)> {
        let range = self.span().range();
        let mut colors = ColorGenerator::new();
        let mut report = Report::build(ReportKind::Error, (file.to_string(), range.clone()))
            .with_config(ariadne::Config::default().with_color(colored))
            .with_code(self.kind().code())
            .with_message(format!("{}: {}", self.kind(), self.message()))
            .with_label(
                Label::new((file.to_string(), range))
                    .with_message(self.message())
                    .with_color(colors.next()),
            );
        if let Some(hint) = self.kind().hint() {
            report = report.with_help(hint);
        }
        report.finish()
    }

    /// Prints a colored diagnostic for this error to stderr.
    pub fn report(&self, file: &str, source: &str) -> std::io::Result<()> {
        self.build_report(file, true)
            .eprint((file.to_string(), Source::from(source.to_string())))
    }

    /// Renders the diagnostic without colors.
    pub fn render(&self, file: &str, source: &str) -> String {
        let mut buffer = Vec::new();
        match self
            .build_report(file, false)
            .write((file.to_string(), Source::from(source.to_string())), &mut buffer)
        {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}
