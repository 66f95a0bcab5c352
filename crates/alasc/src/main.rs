//! `alasc` command-line entry point: `build` lowers a module graph to
//! LLVM IR text, `run` executes a function through the interpreter
//! (spec.md §6).

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use alasc::driver::{self, BuildOptions, LinkMode, OutputFormat, RunOptions};
use alasc::Level;

#[derive(Parser)]
#[command(name = "alasc")]
#[command(about = "ALAS compiler/interpreter: dual-path execution over the ALAS intermediate language", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lower a module (and its imports) to LLVM IR text.
    Build {
        /// Root module file (`<name>.alas.json`).
        #[arg(long)]
        file: PathBuf,

        /// Output path for the generated IR.
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: `ll` (text, default) or `bc` (bitcode, deferred
        /// to an external assembler).
        #[arg(long, default_value = "ll")]
        format: String,

        /// Optimization level 0-3.
        #[arg(short = 'O', default_value_t = 0)]
        opt: u8,

        /// `:`-separated module search path entries.
        #[arg(long)]
        module_path: Option<String>,

        /// Linking mode: `none` (default, one `.ll` per run) or `all`
        /// (merge every compiled module into one).
        #[arg(long, default_value = "none")]
        link: String,

        /// Override which module is treated as the program entry point.
        #[arg(long)]
        main: Option<String>,

        /// Print stage timings to stderr.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Decode a module graph and execute one function through the
    /// interpreter.
    Run {
        /// Root module file (`<name>.alas.json`).
        #[arg(long)]
        file: PathBuf,

        /// Function name to call (default `main`).
        #[arg(long, default_value = "main")]
        r#fn: String,

        /// `:`-separated module search path entries.
        #[arg(long)]
        module_path: Option<String>,

        /// Positional arguments, coerced int -> float -> bool -> string.
        args: Vec<String>,
    },
}

fn parse_module_path(raw: Option<String>) -> Vec<PathBuf> {
    match raw {
        Some(s) => s.split(':').map(PathBuf::from).collect(),
        None => driver::default_module_path(),
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s {
        "ll" => Ok(OutputFormat::Ll),
        "bc" => Ok(OutputFormat::Bc),
        other => Err(format!("unknown --format \"{other}\" (expected ll or bc)")),
    }
}

fn parse_link(s: &str) -> Result<LinkMode, String> {
    match s {
        "none" => Ok(LinkMode::None),
        "all" => Ok(LinkMode::All),
        other => Err(format!("unknown --link \"{other}\" (expected none or all)")),
    }
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Build { file, output, format, opt, module_path, link, main, verbose } => {
            run_build(file, output, format, opt, module_path, link, main, verbose)
        }
        Command::Run { file, r#fn, module_path, args } => run_run(file, r#fn, module_path, args),
    };

    if let Err(message) = result {
        eprintln!("Error: {message}");
        process::exit(1);
    }
}

fn run_build(
    file: PathBuf,
    output: PathBuf,
    format: String,
    opt: u8,
    module_path: Option<String>,
    link: String,
    main_module: Option<String>,
    verbose: bool,
) -> Result<(), String> {
    let opts = BuildOptions {
        file,
        output: output.clone(),
        format: parse_format(&format)?,
        opt_level: Level::from_flag(opt),
        module_path: parse_module_path(module_path),
        link: parse_link(&link)?,
        main_module,
        verbose,
    };
    driver::build(&opts)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn run_run(file: PathBuf, func: String, module_path: Option<String>, args: Vec<String>) -> Result<(), String> {
    let opts = RunOptions { file, func, module_path: parse_module_path(module_path), args };
    let value = driver::run(&opts)?;
    println!("{value:?}");
    Ok(())
}
