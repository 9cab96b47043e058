use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vglang::{HookChain, Interpreter, Repl, StepBudget, TracingHook, VgError};

#[derive(Parser)]
#[command(author, version, about = "VG language interpreter")]
struct Args {
    /// Directory of `.vglib` files registered before anything runs
    #[arg(long, global = true, env = "VG_LIBRARIES_PATH")]
    libraries: Option<PathBuf>,
    /// Log every executed statement (overridden by RUST_LOG)
    #[arg(long, global = true)]
    trace: bool,
    /// Interrupt evaluation after this many statements and loop iterations
    #[arg(long, global = true)]
    max_steps: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a VG script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of VG code and print its value
    Eval { source: String },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.trace);

    let mut interpreter = match build_interpreter(&args) {
        Ok(interpreter) => interpreter,
        Err(err) => return report(&err, args.libraries.as_deref()),
    };
    match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => match interpreter.run_file(&script) {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => report(&err, Some(&script)),
        },
        Command::Repl => match Repl::with_interpreter(interpreter).run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => report(&err, None),
        },
        Command::Eval { source } => match interpreter.interpret(&source) {
            Ok(value) => {
                if !value.is_null() {
                    println!("{value}");
                }
                ExitCode::SUCCESS
            }
            Err(err) => report(&err, None),
        },
    }
}

fn build_interpreter(args: &Args) -> Result<Interpreter, VgError> {
    let mut interpreter = Interpreter::new();
    let mut hooks = HookChain::default();
    if args.trace {
        hooks.push(Box::new(TracingHook));
    }
    if let Some(steps) = args.max_steps {
        hooks.push(Box::new(StepBudget::new(steps)));
    }
    if !hooks.is_empty() {
        interpreter.set_hook(Box::new(hooks));
    }
    if let Some(dir) = &args.libraries {
        interpreter.load_library_dir(dir)?;
    }
    Ok(interpreter)
}

/// RUST_LOG wins; otherwise `--trace` turns on debug output for the crate.
fn init_tracing(trace: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if trace { "vglang=debug" } else { "warn" })
    });
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn report(err: &VgError, file: Option<&Path>) -> ExitCode {
    match err {
        VgError::Diagnostic(diag) => eprintln!("{}", diag.render(file)),
        VgError::Io(io) => match file {
            Some(file) => eprintln!("error: {}: {io}", file.display()),
            None => eprintln!("error: {io}"),
        },
    }
    ExitCode::FAILURE
}
