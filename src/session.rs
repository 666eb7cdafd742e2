use tracing::{debug, info, warn};

use std::sync::Arc;

use crate::ast::Program;
use crate::codegen::{Bytecode, Emitter};
use crate::config::Config;
use crate::errors::{HelixError, HelixResult};
use crate::ir::{IRBuilder, IRValidator, IrNode, Optimizer};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::runtime::{
    DomainRegistry, HeapStats, Interpreter, PrintHandler, Runtime, Value, Vm,
    value::Deserializer,
};
use crate::span::Span;
use crate::stdlib::{self, Library, Natives, StdlibLoader};
use crate::typechecker::Type;
use crate::validation::{ValidatedProgram, Validator};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub value: Value,
    /// Captured `print` output. Empty unless capture is enabled.
    pub output: String,
    /// Heap counters after teardown.
    pub heap: HeapStats,
}

/// Context threaded through every pipeline entry point: configuration,
/// natives, domain types and loaded libraries. Each run builds fresh engine
/// state, so sessions never share environments or heap objects.
pub struct Session {
    config: Config,
    natives: Natives,
    domains: DomainRegistry,
    nominal_types: Vec<String>,
    libraries: Vec<Library>,
    file_name: String,
    capture_output: bool,
}

impl Session {
    /// Creates a session, loading the library directory named by the config.
    pub fn new(config: Config) -> HelixResult<Self> {
        let mut domains = DomainRegistry::default();
        stdlib::domain::register_deserializers(&mut domains);

        let mut session = Session {
            config,
            natives: Natives::standard(),
            domains,
            nominal_types: vec![],
            libraries: vec![],
            file_name: "<input>".to_string(),
            capture_output: false,
        };
        if let Some(dir) = session.config.stdlib_path.clone() {
            let mut loader = StdlibLoader::new(session.natives.clone());
            loader.load_dir(&dir)?;
            session.libraries = loader.into_libraries();
        }
        Ok(session)
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Collects `print` output into [`Execution::output`] instead of stdout.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn natives(&self) -> &Natives {
        &self.natives
    }

    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    /// Registers a native function for both the validator and the runtime.
    pub fn define_native<F>(&mut self, name: &str, signature: Arc<Type>, func: F)
    where
        F: Fn(&PrintHandler, &[Value]) -> Result<Value, String> + 'static,
    {
        self.natives.insert(name, signature, func);
    }

    /// Makes `name` usable as an opaque type in annotations.
    pub fn define_domain_type(&mut self, name: &str, deserializer: Deserializer) {
        self.nominal_types.push(name.to_string());
        self.domains.register(name, deserializer);
    }

    /// Loads a library module from source. Later programs may `import` it
    /// and call its exports.
    pub fn load_library(&mut self, module: &str, source: &str) -> HelixResult<()> {
        let mut loader = StdlibLoader::new(self.natives.clone());
        for library in self.libraries.drain(..) {
            loader.adopt(library);
        }
        let result = loader.load_source(module, source).map(|_| ());
        self.libraries = loader.into_libraries();
        result
    }

    pub fn parse(&self, source: &str) -> HelixResult<Program> {
        parse(tokenize(source)?)
    }

    /// Succeeds only when no error was found.
    pub fn validate(&self, program: Program) -> Result<ValidatedProgram, Vec<HelixError>> {
        let mut prelude = self.natives.prelude();
        let mut loader = StdlibLoader::new(self.natives.clone());
        for library in &self.libraries {
            loader.adopt(library.clone());
        }
        loader.inject(&mut prelude).map_err(|error| vec![error])?;

        Validator::new(prelude)
            .with_modules(self.libraries.iter().map(|lib| lib.name.clone()))
            .with_nominal_types(self.nominal_types.iter().cloned())
            .validate(program)
    }

    /// Parses and validates.
    pub fn check(&self, source: &str) -> Result<ValidatedProgram, Vec<HelixError>> {
        let program = self.parse(source).map_err(|error| vec![error])?;
        self.validate(program)
    }

    /// Lowers the loaded libraries and `program` into one IR tree, libraries
    /// first.
    pub fn build_ir(&self, program: &ValidatedProgram) -> HelixResult<IrNode> {
        let mut builder = IRBuilder::new().with_externals(self.natives.names());
        let mut children = vec![];
        for library in &self.libraries {
            children.extend(builder.build(library.program.program())?.children);
        }
        let root = builder.build(program.program())?;
        if children.is_empty() {
            return Ok(root);
        }
        // Keeps a trailing library expression from becoming the result.
        children.push(IrNode::block(vec![], Span::default()));
        children.extend(root.children);
        Ok(IrNode::block(children, root.metadata.span))
    }

    /// Builds IR, optimizes it per `optimization_level` and emits bytecode.
    #[tracing::instrument(level = "debug", skip_all, fields(file = %self.file_name))]
    pub fn compile(&self, program: &ValidatedProgram) -> HelixResult<Bytecode> {
        let ir = self.build_ir(program)?;
        let optimizer = Optimizer::for_level(self.config.optimization_level);
        debug!(passes = ?optimizer.pass_names(), "optimizing");
        let ir = optimizer.optimize(ir);

        if self.config.debug_mode {
            debug!("optimized ir:\n{ir}");
            IRValidator::new()
                .with_externals(self.natives.names())
                .validate(&ir)
                .map_err(|errors| {
                    HelixError::type_error(format!("invalid IR: {}", errors.join("; ")), ir.span())
                })?;
        }
        Emitter::new().compile(&ir)
    }

    fn runtime(&self) -> HelixResult<Runtime> {
        let printer = if self.capture_output {
            PrintHandler::buffer()
        } else {
            PrintHandler::Stdout
        };
        let mut rt = Runtime::new(self.config.max_stack_depth).with_printer(printer);
        self.natives.install(&mut rt)?;
        Ok(rt)
    }

    /// Runs with `body`, then tears the runtime down on every path.
    fn execute(
        &self,
        body: impl FnOnce(&mut Runtime) -> HelixResult<Value>,
    ) -> HelixResult<Execution> {
        let mut rt = self.runtime()?;
        let result = body(&mut rt);
        let teardown = rt.teardown();
        let value = result?;
        teardown?;
        let heap = rt.heap().stats();
        if heap.live != 0 {
            warn!(live = heap.live, "heap objects outlived teardown");
        }
        Ok(Execution {
            value,
            output: rt.printer().output(),
            heap,
        })
    }

    /// Tree-walking execution. Libraries run first, into the same globals.
    #[tracing::instrument(level = "debug", skip_all, fields(file = %self.file_name))]
    pub fn interpret(&self, program: &ValidatedProgram) -> HelixResult<Execution> {
        self.execute(|rt| {
            for library in &self.libraries {
                Interpreter::new(rt).run(library.program.program())?;
            }
            Interpreter::new(rt).run(program.program())
        })
    }

    #[tracing::instrument(level = "debug", skip_all, fields(file = %self.file_name))]
    pub fn run_bytecode(&self, code: &Bytecode) -> HelixResult<Execution> {
        self.execute(|rt| Vm::new(rt, code).run())
    }

    /// The whole pipeline in the configured runtime mode.
    pub fn run(&self, source: &str) -> Result<Execution, Vec<HelixError>> {
        let program = self.check(source)?;
        let execution = match self.config.runtime_mode {
            crate::config::RuntimeMode::Interpreted => self.interpret(&program),
            crate::config::RuntimeMode::Compiled => self
                .compile(&program)
                .and_then(|code| self.run_bytecode(&code)),
        };
        let execution = execution.map_err(|error| vec![error])?;
        info!(mode = %self.config.runtime_mode, result = %execution.value, "run finished");
        Ok(execution)
    }

    /// Renders diagnostics as reports against `source`.
    pub fn render_errors(&self, errors: &[HelixError], source: &str) -> String {
        errors
            .iter()
            .map(|error| error.render(&self.file_name, source))
            .collect()
    }
}
