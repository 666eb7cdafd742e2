//! HelixLang command line.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use yansi::Paint;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use helixlang::codegen::Bytecode;
use helixlang::{Config, HelixError, RuntimeMode, Session, init_tracing};

#[derive(Parser)]
#[command(name = "helix")]
#[command(author, version, about = "HelixLang compiler and runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Optimization level, 0 to 3
    #[arg(short = 'O', long, global = true)]
    opt_level: Option<u8>,

    /// Maximum call depth
    #[arg(long, global = true)]
    max_stack_depth: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file
    Run {
        file: PathBuf,

        /// Execution mode, overriding the configuration
        #[arg(short, long)]
        mode: Option<RuntimeMode>,
    },

    /// Parse and validate a source file
    Check { file: PathBuf },

    /// Compile a source file to a bytecode listing
    Compile {
        file: PathBuf,

        /// Output file; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a bytecode listing
    Exec { listing: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = cli.opt_level {
        config.optimization_level = level;
    }
    if let Some(depth) = cli.max_stack_depth {
        config.max_stack_depth = depth;
    }
    if let Commands::Run {
        mode: Some(mode), ..
    } = &cli.command
    {
        config.runtime_mode = *mode;
    }
    config.validate().context("invalid command line option")?;
    init_tracing(config.log_level.as_filter());

    match cli.command {
        Commands::Run { file, .. } => run_file(config, &file),
        Commands::Check { file } => check(config, &file),
        Commands::Compile { file, output } => compile(config, &file, output),
        Commands::Exec { listing } => exec(config, &listing),
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

fn session(config: Config, path: &Path) -> Result<Session> {
    let session = Session::new(config).context("failed to load the standard library")?;
    Ok(session.with_file_name(path.display().to_string()))
}

fn report(session: &Session, errors: &[HelixError], source: &str) -> anyhow::Error {
    eprint!("{}", session.render_errors(errors, source));
    anyhow::anyhow!("{} error(s) in {}", errors.len(), session.file_name())
}

fn run_file(config: Config, path: &Path) -> Result<()> {
    let source = read(path)?;
    let session = session(config, path)?;
    session
        .run(&source)
        .map_err(|errors| report(&session, &errors, &source))?;
    Ok(())
}

fn check(config: Config, path: &Path) -> Result<()> {
    let source = read(path)?;
    let session = session(config, path)?;
    let program = session
        .check(&source)
        .map_err(|errors| report(&session, &errors, &source))?;
    println!(
        "{} {} ({} top-level declaration(s))",
        "ok".green().bold(),
        path.display(),
        program.exports().len()
    );
    Ok(())
}

fn compile(config: Config, path: &Path, output: Option<PathBuf>) -> Result<()> {
    let source = read(path)?;
    let session = session(config, path)?;
    let program = session
        .check(&source)
        .map_err(|errors| report(&session, &errors, &source))?;
    let code = session
        .compile(&program)
        .map_err(|error| report(&session, &[error], &source))?;

    match output {
        Some(out) => fs::write(&out, code.to_string())
            .with_context(|| format!("failed to write {}", out.display()))?,
        None => print!("{code}"),
    }
    Ok(())
}

fn exec(config: Config, path: &Path) -> Result<()> {
    let listing = read(path)?;
    let session = session(config, path)?;
    // Listing spans count instructions, not bytes, so no source excerpt.
    let code = Bytecode::parse(&listing).with_context(|| format!("in {}", path.display()))?;
    if code.is_empty() {
        bail!("{} contains no instructions", path.display());
    }
    session
        .run_bytecode(&code)
        .with_context(|| format!("while executing {}", path.display()))?;
    Ok(())
}
