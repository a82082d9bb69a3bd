//! cj: compile and run CJ scripts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use log::{debug, info};

use cjlang::config::RuntimeConfig;
use cjlang::error::report;
use cjlang::error::CjError;
use cjlang::highlight::SyntaxHighlighter;
use cjlang::lexer::{self, FileLoader, SourceMap};
use cjlang::natives::{self, EXTENSIONS};
use cjlang::vm::{disassemble, disassemble_packed, Vm};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script to run
    script: PathBuf,

    /// Arguments passed to `main(inArgs)`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Native extension set merged into the global namespace
    #[arg(long, default_value = "default")]
    ext: String,

    /// Print the compiled bytecode instead of running
    #[arg(long)]
    disassemble: bool,

    /// Print every instruction as its packed 64-bit word instead of running
    #[arg(long)]
    packed: bool,

    /// Print the token stream instead of running
    #[arg(long)]
    tokens: bool,

    /// Print the script with syntax highlighting and exit
    #[arg(long)]
    highlight: bool,

    /// Report compile and run times on stderr
    #[arg(long)]
    time: bool,

    /// Collect before every allocation
    #[arg(long)]
    gc_stress: bool,

    /// Log every executed instruction (needs -vvv)
    #[arg(long)]
    trace: bool,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    process::exit(run(&cli));
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(cli: &Cli) -> RuntimeConfig {
    let dir = cli.script.parent().unwrap_or_else(|| Path::new("."));
    let mut config = RuntimeConfig::load(dir);
    if cli.gc_stress {
        config.gc_stress = true;
    }
    if cli.trace {
        config.trace_execution = true;
    }
    if cli.no_color {
        config.color = false;
    }
    config
}

fn run(cli: &Cli) -> i32 {
    let config = load_config(cli);
    if !config.color {
        colored::control::set_override(false);
    }
    debug!("{:?}", config);

    let Some(ext) = natives::extension(&cli.ext) else {
        let known: Vec<&str> = EXTENSIONS.iter().map(|e| e.name).collect();
        eprintln!("Unknown extension '{}' (available: {})", cli.ext, known.join(", "));
        return 64;
    };

    let text = match fs::read_to_string(&cli.script) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Could not read '{}': {}", cli.script.display(), err);
            return CjError::Io(err).exit_code();
        }
    };
    let name = cli.script.display().to_string();
    let loader = FileLoader::for_script(&cli.script);
    let mut sources = SourceMap::new();

    if cli.highlight {
        print!("{}", SyntaxHighlighter::new().highlight(&text));
        return 0;
    }
    if cli.tokens {
        return match lexer::tokenize_into(&name, &text, &loader, &mut sources) {
            Ok(stream) => {
                for token in &stream.tokens {
                    println!("{:>4}:{:<3} {:?}", token.span.line, token.span.column, token.kind);
                }
                0
            }
            Err(err) => fail(&err.into(), &sources),
        };
    }

    let started = Instant::now();
    let program = match cjlang::compile_source(&name, &text, &loader, Some(ext), &mut sources) {
        Ok(program) => program,
        Err(err) => return fail(&err, &sources),
    };
    let compiled = started.elapsed();
    info!("compiled {} chunks from {} files", program.chunks.len(), sources.len());

    if cli.disassemble || cli.packed {
        if cli.disassemble {
            print!("{}", disassemble(&program));
        }
        if cli.packed {
            print!("{}", disassemble_packed(&program));
        }
        return 0;
    }

    let mut vm = Vm::new(program, config);
    let started = Instant::now();
    let result = vm.run_main(&cli.args);
    let ran = started.elapsed();
    vm.log_heap_stats();

    if cli.time {
        eprintln!("compile: {:?}, run: {:?}", compiled, ran);
    }
    match result {
        Ok(()) => 0,
        Err(err) => fail(&err, &vm.program().sources),
    }
}

fn fail(err: &CjError, sources: &SourceMap) -> i32 {
    eprint!("\n{}", report::render(err, sources));
    err.exit_code()
}
