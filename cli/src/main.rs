mod config;
mod logger;
mod test_runner;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use interpreter::{InlineStyle, LineMarkerFormat, Options, Preprocessed};
use tiel::source::SourceMap;

use crate::config::FileConfig;

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

#[derive(Parser)]
#[command(name = "fortiel", version, about = "Fortran preprocessor")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preprocess source files
    Run(RunArgs),

    /// Run .test.f90 test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Source files, processed in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write output here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Add a directory to the include search path. Repeatable.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Bind NAME to true, or to the value of EXPR. Repeatable.
    #[arg(short = 'D', long = "define", value_name = "NAME[=EXPR]")]
    defines: Vec<String>,

    /// Line marker format: fpp, cpp or none
    #[arg(short = 'N', long, value_name = "FORMAT")]
    line_markers: Option<LineMarkerFormat>,

    /// Inline expression markers: backtick or angle
    #[arg(long, value_name = "STYLE")]
    inline_style: Option<InlineStyle>,

    /// Maximum nesting of macro expansions
    #[arg(long, value_name = "N")]
    max_expansion_depth: Option<usize>,

    /// Configuration file (default: ./fortiel.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Parse only, don't run (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the parsed directive tree
    #[arg(long)]
    ast: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.f90 file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `fortiel file.f90` works like `fortiel run file.f90`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(first) = args.get(1) {
        let passthrough = ["-h", "--help", "-V", "--version"];
        if !SUBCOMMANDS.contains(&first.as_str()) && !passthrough.contains(&first.as_str()) {
            args.insert(1, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    logger::init(cli.verbose);

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            if test_args.list_categories {
                test_runner::list_categories(&test_args.path);
                return;
            }
            let exit_code = test_runner::run_tests(&test_args.path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

/// File configuration first, then command-line flags on top.
fn build_options(args: &RunArgs) -> Result<Options, String> {
    let mut options = FileConfig::load(args.config.as_deref())?.into_options()?;
    options.include_paths.extend(args.include_paths.iter().cloned());
    for definition in &args.defines {
        options.define(definition);
    }
    if let Some(format) = args.line_markers {
        options.line_markers = format;
    }
    if let Some(style) = args.inline_style {
        options.inline_style = style;
    }
    if let Some(depth) = args.max_expansion_depth {
        options.max_expansion_depth = depth;
    }
    Ok(options)
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color { ColorChoice::Never } else { ColorChoice::Auto };
    let writer = StandardStream::stderr(color_choice);

    let options = build_options(&args).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        process::exit(2);
    });

    if args.check || args.ast {
        for file in &args.files {
            check_file(file, &options, args.ast, &writer);
        }
        return;
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(e) => {
                eprintln!("error: cannot create '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for file in &args.files {
        let Preprocessed { result, sources } = interpreter::preprocess_file_with_sources(file, &options);
        match result {
            Ok(lines) => {
                let text = interpreter::render(&lines, options.line_markers);
                if let Err(e) = out.write_all(text.as_bytes()) {
                    eprintln!("error: cannot write output: {}", e);
                    process::exit(1);
                }
            }
            Err(error) => {
                let _ = out.flush();
                emit(&writer, &sources, &error.to_diagnostic(&sources));
                process::exit(1);
            }
        }
    }

    if let Err(e) = out.flush() {
        eprintln!("error: cannot write output: {}", e);
        process::exit(1);
    }
}

fn check_file(file: &Path, options: &Options, dump: bool, writer: &StandardStream) {
    let mut parser = tiel::parser::Parser::new(options.include_paths.clone());
    match parser.parse_file(file) {
        Ok(program) if dump => println!("{:#?}", program),
        Ok(_) => eprintln!("ok: {} parsed successfully", file.display()),
        Err(error) => {
            emit(writer, parser.sources(), &error.to_diagnostic(parser.sources()));
            process::exit(1);
        }
    }
}

fn emit(writer: &StandardStream, sources: &SourceMap, diagnostic: &Diagnostic<usize>) {
    let config = term::Config::default();
    let _ = term::emit_to_write_style(&mut writer.lock(), &config, sources.files(), diagnostic);
}
