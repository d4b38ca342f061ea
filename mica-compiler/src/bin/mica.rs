//! The Mica command line

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use mica_compiler::{
    render, runner_for, BackendKind, CompilerConfig, CompilerContext, Pipeline, Severity,
};
use mica_syntax::ModuleTree;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The Mica compiler
#[derive(Parser)]
#[command(name = "mica")]
#[command(about = "Compiler and runtime for the Mica language")]
#[command(version)]
struct Cli {
    /// Start the editor query server instead of running a command
    #[arg(long, global = true)]
    server: bool,

    /// Additive debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// The module tree to serve queries for (with --server)
    #[arg(long = "input", global = true)]
    server_input: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a module without generating code
    Check(CheckArgs),

    /// Compile a module to the configured backend's artifact
    Compile(CompileArgs),

    /// Compile and run a module, forwarding the program's exit code
    Run(RunArgs),

    /// List the available backends
    Targets,
}

#[derive(Args)]
struct CheckArgs {
    /// A serialized surface module (.mica.json)
    input: PathBuf,
}

#[derive(Args)]
struct CompileArgs {
    /// A serialized surface module (.mica.json)
    input: PathBuf,

    /// Output directory for generated artifacts
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Target backend
    #[arg(short, long, default_value = "js")]
    backend: BackendKind,

    /// Libraries forwarded to the native linker
    #[arg(long = "gcc-libraries")]
    gcc_libraries: Vec<String>,

    /// Include directories forwarded to the native compiler
    #[arg(long = "gcc-includes")]
    gcc_includes: Vec<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// A serialized surface module (.mica.json)
    input: PathBuf,

    /// Target backend
    #[arg(short, long, default_value = "js")]
    backend: BackendKind,

    /// Arguments forwarded to the program
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "[error]".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<i32> {
    if cli.server {
        let input = cli.server_input.context("--server needs --input <module.mica.json>")?;
        let tree = load_tree(&input)?;
        let stdin = std::io::stdin();
        mica_compiler::server::serve(&tree, stdin.lock(), std::io::stdout())?;
        return Ok(0);
    }

    match cli.command {
        None => anyhow::bail!("no command given; try 'mica --help'"),
        Some(Commands::Targets) => {
            for (name, note) in [
                ("js", "reference semantics, runs with node"),
                ("chez", "ChezScheme"),
                ("llvm", "native via LLVM"),
                ("ml", "Standard ML"),
                ("jit", "the Mica JIT"),
                ("core", "serialized core for tooling"),
            ] {
                println!("{:6} {}", name.bold(), note);
            }
            Ok(0)
        }
        Some(Commands::Check(args)) => {
            let tree = load_tree(&args.input)?;
            let mut ctx = CompilerContext::new();
            let pipeline = Pipeline::new(CompilerConfig::default());
            let outcome = pipeline.compile(&mut ctx, &tree);
            let had_errors = report(&ctx);
            debug!(ok = outcome.is_ok(), "check finished");
            Ok(if had_errors { 1 } else { 0 })
        }
        Some(Commands::Compile(args)) => {
            let tree = load_tree(&args.input)?;
            let mut ctx = CompilerContext::new();
            let config = CompilerConfig {
                backend: args.backend,
                output_dir: args.output,
                gcc_libraries: args.gcc_libraries,
                gcc_includes: args.gcc_includes,
                ..CompilerConfig::default()
            };
            let pipeline = Pipeline::new(config);
            let outcome = pipeline.compile(&mut ctx, &tree);
            let had_errors = report(&ctx);
            match outcome {
                Ok(outcome) if !had_errors => {
                    let artifact = pipeline.emit(&outcome.core)?;
                    println!("{} {}", "compiled".green().bold(), artifact.display());
                    Ok(0)
                }
                _ => Ok(1),
            }
        }
        Some(Commands::Run(args)) => {
            let tree = load_tree(&args.input)?;
            let mut ctx = CompilerContext::new();
            let config = CompilerConfig {
                backend: args.backend,
                ..CompilerConfig::default()
            };
            let pipeline = Pipeline::new(config);
            let outcome = pipeline.compile(&mut ctx, &tree);
            let had_errors = report(&ctx);
            let Ok(outcome) = outcome else { return Ok(1) };
            if had_errors {
                return Ok(1);
            }

            let runner = runner_for(&pipeline.config);
            runner.check_setup()?;
            let artifact = pipeline.emit(&outcome.core)?;
            let executable = runner.build(&artifact)?;
            // The program's exit code is the command's exit code
            let code = runner.eval(&executable, &args.args)?;
            Ok(code)
        }
    }
}

fn load_tree(path: &Path) -> Result<ModuleTree> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
}

/// Print the sorted, deduplicated checkpoint view; returns whether any
/// errors were among it
fn report(ctx: &CompilerContext) -> bool {
    let mut had_errors = false;
    for message in ctx.messages.sorted_deduped() {
        if message.severity == Severity::Error {
            had_errors = true;
        }
        let rendered = render(&message, None);
        match message.severity {
            Severity::Error => eprint!("{}", rendered.red()),
            Severity::Warning => eprint!("{}", rendered.yellow()),
        }
    }
    had_errors
}
