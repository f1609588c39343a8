pub mod directive;
pub mod error;
pub mod expression;
pub mod include;
pub mod lexer;
mod structural;

use std::path::{Path, PathBuf};

pub use error::{ErrorKind, ParseError};
pub use expression::{ExpressionError, parse_expression};
pub use lexer::{Line, LineKind};
pub use structural::{MacroSignatures, resolve};

use crate::Program;
use crate::block::Node;
use crate::parser::include::IncludeResolver;
use crate::source::SourceMap;

/// Parser entry point. Keeps the sources it has read and the macro
/// signatures it has seen, so template lines produced later can be
/// resolved against the same state.
pub struct Parser {
    includes: IncludeResolver,
    signatures: MacroSignatures,
}

impl Parser {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Parser {
            includes: IncludeResolver::new(include_paths),
            signatures: MacroSignatures::default(),
        }
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<Program, ParseError> {
        let lines = self.includes.load_file(path)?;
        self.program(lines)
    }

    pub fn parse_source(&mut self, name: &str, source: &str) -> Result<Program, ParseError> {
        let lines = self.includes.load_source(name, source)?;
        self.program(lines)
    }

    fn program(&mut self, lines: Vec<Line>) -> Result<Program, ParseError> {
        let nodes = self.resolve_lines(lines)?;
        Ok(Program {
            nodes,
            missing_final_newline: self.includes.root_missing_final_newline(),
        })
    }

    /// Build the node tree for already lexed lines, e.g. a macro template.
    pub fn resolve_lines(&mut self, lines: Vec<Line>) -> Result<Vec<Node>, ParseError> {
        structural::resolve(lines, &mut self.signatures)
    }

    pub fn sources(&self) -> &SourceMap {
        self.includes.sources()
    }

    pub fn into_sources(self) -> SourceMap {
        self.includes.into_sources()
    }
}
