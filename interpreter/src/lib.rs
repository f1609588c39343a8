pub mod builtins;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod macros;
pub mod options;
pub mod output;
pub mod runtime_value;
pub mod substitution;

use std::path::Path;

use tiel::parser::Parser;
use tiel::source::SourceMap;

pub use environment::Environment;
pub use error::{DiagnosticError, Error, RuntimeError};
pub use evaluator::{Evaluator, StandardEvaluator};
pub use executor::Interpreter;
pub use options::Options;
pub use output::{LineMarkerFormat, OutputLine, render};
pub use runtime_value::RuntimeValue;
pub use substitution::InlineStyle;

/// Result of a run together with every source it read, for diagnostics.
pub struct Preprocessed {
    pub result: Result<Vec<OutputLine>, Error>,
    pub sources: SourceMap,
}

/// Preprocess in-memory text reported under `name`.
pub fn preprocess_source(name: &str, text: &str, options: &Options) -> Result<Vec<OutputLine>, Error> {
    preprocess_source_with_sources(name, text, options).result
}

/// Preprocess the file at `path`.
pub fn preprocess_file(path: &Path, options: &Options) -> Result<Vec<OutputLine>, Error> {
    preprocess_file_with_sources(path, options).result
}

pub fn preprocess_source_with_sources(name: &str, text: &str, options: &Options) -> Preprocessed {
    let mut parser = Parser::new(options.include_paths.clone());
    let program = parser.parse_source(name, text);
    finish(parser, program, options)
}

pub fn preprocess_file_with_sources(path: &Path, options: &Options) -> Preprocessed {
    let mut parser = Parser::new(options.include_paths.clone());
    let program = parser.parse_file(path);
    finish(parser, program, options)
}

fn finish(parser: Parser, program: Result<tiel::Program, tiel::parser::ParseError>, options: &Options) -> Preprocessed {
    let result = program
        .map_err(Error::from)
        .and_then(|program| Interpreter::new(options.clone()).run(&program).map_err(Error::from));
    Preprocessed {
        result,
        sources: parser.into_sources(),
    }
}
