pub mod ast;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod span;
pub mod stack;
pub mod stdlib;
pub mod symbols;
pub mod typechecker;
pub mod validation;

use std::sync::Once;

pub use config::{Config, RuntimeMode};
pub use errors::{ErrorKind, HelixError, HelixResult};
pub use session::{Execution, Session};

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber. `HELIX_LOG` takes `EnvFilter` directives;
/// without it `fallback` (e.g. "info") applies. Only the first call has any
/// effect.
pub fn init_tracing(fallback: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::try_from_env("HELIX_LOG")
            .unwrap_or_else(|_| EnvFilter::new(fallback));
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    });
}
