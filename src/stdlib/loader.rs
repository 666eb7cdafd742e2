use tracing::{debug, info};

use std::fs;
use std::path::Path;

use crate::errors::{HelixError, HelixResult};
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::span::Span;
use crate::stdlib::Natives;
use crate::symbols::{Symbol, SymbolError, SymbolTable};
use crate::validation::{ValidatedProgram, Validator};

pub const LIBRARY_EXTENSION: &str = "hl";

/// A validated library module.
#[derive(Debug, Clone)]
pub struct Library {
    pub name: String,
    pub program: ValidatedProgram,
}

impl Library {
    pub fn exports(&self) -> &[Symbol] {
        self.program.exports()
    }
}

/// Loads library modules through the lexer, parser and validator. Each
/// module sees the natives plus everything loaded before it.
pub struct StdlibLoader {
    natives: Natives,
    libraries: Vec<Library>,
}

impl StdlibLoader {
    pub fn new(natives: Natives) -> Self {
        StdlibLoader {
            natives,
            libraries: vec![],
        }
    }

    /// Takes over a module validated by another loader.
    pub fn adopt(&mut self, library: Library) {
        self.libraries.push(library);
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.libraries.iter().map(|library| library.name.as_str())
    }

    /// Names exported by every loaded module.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.libraries
            .iter()
            .flat_map(|library| library.exports())
            .map(|symbol| symbol.name.as_str())
    }

    pub fn into_libraries(self) -> Vec<Library> {
        self.libraries
    }

    #[tracing::instrument(level = "debug", skip(self, source))]
    pub fn load_source(&mut self, module: &str, source: &str) -> HelixResult<&Library> {
        if self.module_names().any(|name| name == module) {
            return Err(HelixError::load(
                module,
                format!("module '{module}' is already loaded"),
                Span::default(),
            ));
        }

        let load_error = |error: HelixError| {
            HelixError::load(
                module,
                format!("in module '{module}': {}", error.message()),
                error.span(),
            )
        };
        let tokens = tokenize(source).map_err(load_error)?;
        let program = parse(tokens).map_err(load_error)?;

        let mut prelude = self.natives.prelude();
        self.inject(&mut prelude)?;
        let program = Validator::new(prelude)
            .with_modules(self.module_names().map(String::from).collect::<Vec<_>>())
            .validate(program)
            .map_err(|errors| {
                let count = errors.len();
                match errors.into_iter().next() {
                    Some(first) if count > 1 => HelixError::load(
                        module,
                        format!(
                            "in module '{module}': {} (and {} more error(s))",
                            first.message(),
                            count - 1
                        ),
                        first.span(),
                    ),
                    Some(first) => load_error(first),
                    None => HelixError::load(module, "validation failed", Span::default()),
                }
            })?;

        debug!(module, exports = program.exports().len(), "loaded module");
        self.libraries.push(Library {
            name: module.to_string(),
            program,
        });
        self.libraries
            .last()
            .ok_or_else(|| HelixError::load(module, "module vanished", Span::default()))
    }

    /// Loads every `*.hl` file in `dir`, in file-name order. Returns how
    /// many modules were loaded.
    pub fn load_dir(&mut self, dir: &Path) -> HelixResult<usize> {
        let io_error = |error: std::io::Error| {
            HelixError::load(
                dir.display().to_string(),
                format!("cannot read library directory {}: {error}", dir.display()),
                Span::default(),
            )
        };

        let mut files = vec![];
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().is_some_and(|ext| ext == LIBRARY_EXTENSION) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(HelixError::load(
                dir.display().to_string(),
                format!("no library files (*.{LIBRARY_EXTENSION}) in {}", dir.display()),
                Span::default(),
            ));
        }
        files.sort();

        for path in &files {
            let module = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = fs::read_to_string(path).map_err(io_error)?;
            self.load_source(&module, &source)?;
        }
        info!(count = files.len(), dir = %dir.display(), "loaded library directory");
        Ok(files.len())
    }

    /// Adds every export to the current scope of `table`. A name that is
    /// already declared there is a fatal load error.
    pub fn inject(&self, table: &mut SymbolTable) -> HelixResult<()> {
        for library in &self.libraries {
            for symbol in library.exports() {
                let symbol = symbol.clone().with_metadata("module", library.name.as_str());
                if let Err(SymbolError::Duplicate(name)) = table.insert(symbol) {
                    return Err(HelixError::load(
                        library.name.as_str(),
                        format!(
                            "'{name}' from module '{}' collides with an existing declaration",
                            library.name
                        ),
                        Span::default(),
                    ));
                }
            }
        }
        Ok(())
    }
}
