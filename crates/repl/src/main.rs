//! `wisp` — the CLI driver: no-args REPL, one-arg file mode, `-c <src>`
//! inline mode.
//!
//! Grounded in `examples/original_source/src/Application/Main.cpp`'s three
//! dispatch branches and exit codes (0 ok, 65 compile error, 70 runtime
//! error, 64 bad usage); 74 for an unreadable file is this crate's own
//! addition, the conventional exit code a Crafting-Interpreters-style
//! driver uses for `ReadFile` failure.

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wisp_runtime::{Config, InterpretResult, VM};

#[derive(Parser)]
#[command(name = "wisp", version, about = "The wisp language REPL and script runner")]
struct Args {
    /// Script to run. Omit to start the REPL.
    file: Option<PathBuf>,

    /// Run SOURCE as an inline program instead of a file.
    #[arg(short = 'c', value_name = "SOURCE")]
    command: Option<String>,

    /// TOML file tuning VM stack/frame limits.
    #[arg(long, value_name = "PATH", default_value = "wisp.toml")]
    config: PathBuf,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("WISP_LOG").unwrap_or_else(|_| EnvFilter::new("off")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: wisp [PATH_TO_SCRIPT] | wisp -c SOURCE");
            return ExitCode::from(64);
        }
    };

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wisp: {e}");
            return ExitCode::from(64);
        }
    };
    let mut vm = VM::with_config(config);

    match (args.file, args.command) {
        (Some(_), Some(_)) => {
            eprintln!("Usage: wisp [PATH_TO_SCRIPT] | wisp -c SOURCE");
            ExitCode::from(64)
        }
        (Some(path), None) => run_file(&mut vm, &path),
        (None, Some(source)) => match run_source(&mut vm, &source) {
            InterpretResult::Ok => ExitCode::SUCCESS,
            InterpretResult::CompileError => ExitCode::from(65),
            InterpretResult::RuntimeError => ExitCode::from(70),
        },
        (None, None) => {
            run_repl(&mut vm);
            ExitCode::SUCCESS
        }
    }
}

fn run_file(vm: &mut VM, path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("wisp: could not open file \"{}\": {e}", path.display());
            return ExitCode::from(74);
        }
    };
    match run_source(vm, &source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}

fn run_source(vm: &mut VM, source: &str) -> InterpretResult {
    match wispc_lib::compile(source) {
        Ok(function) => vm.interpret(function),
        Err(_) => InterpretResult::CompileError,
    }
}

fn run_repl(vm: &mut VM) {
    let mut editor = DefaultEditor::new().expect("failed to initialize line editor");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                run_source(vm, &line);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("wisp: readline error: {e}");
                break;
            }
        }
    }
}
