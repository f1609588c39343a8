use std::path::PathBuf;

use crate::output::LineMarkerFormat;
use crate::substitution::InlineStyle;

pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 64;

/// Settings for one preprocessing run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directories searched for included files after the including file's
    /// own directory.
    pub include_paths: Vec<PathBuf>,
    /// Variables bound before the first line, as `(name, expression)`.
    pub defines: Vec<(String, String)>,
    pub line_markers: LineMarkerFormat,
    pub inline_style: InlineStyle,
    pub max_expansion_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            include_paths: Vec::new(),
            defines: Vec::new(),
            line_markers: LineMarkerFormat::default(),
            inline_style: InlineStyle::default(),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

impl Options {
    /// Add a command-line style definition: `NAME` binds `true`,
    /// `NAME=EXPR` binds the value of `EXPR`.
    pub fn define(&mut self, definition: &str) {
        let (name, expression) = match definition.split_once('=') {
            Some((name, expression)) => (name.trim(), expression.trim()),
            None => (definition.trim(), "true"),
        };
        self.defines.push((name.to_string(), expression.to_string()));
    }
}
