use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic, Label};

use crate::location::SourceLocation;
use crate::source::SourceMap;

/// The category of a preprocessing error. Shared by the front end and the
/// interpreter so that every fatal error reports one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Syntax,
    Structure,
    UnterminatedBlock,
    Name,
    Type,
    Eval,
    CyclicInclude,
    Io,
    MacroMatch,
    ExpansionDepth,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Lex => "LexError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Structure => "StructureError",
            ErrorKind::UnterminatedBlock => "UnterminatedBlockError",
            ErrorKind::Name => "NameError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Eval => "EvalError",
            ErrorKind::CyclicInclude => "CyclicIncludeError",
            ErrorKind::Io => "IoError",
            ErrorKind::MacroMatch => "MacroMatchError",
            ErrorKind::ExpansionDepth => "ExpansionDepthError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while lexing, splicing includes, or matching directive
/// blocks. Every error points at the line that caused it.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
    /// A second location worth showing, e.g. the opener of a mismatched block.
    pub related: Option<(SourceLocation, String)>,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        ParseError {
            kind,
            message: message.into(),
            location,
            related: None,
            notes: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        ParseError::new(ErrorKind::Syntax, message, location)
    }

    pub fn structure(message: impl Into<String>, location: SourceLocation) -> Self {
        ParseError::new(ErrorKind::Structure, message, location)
    }

    pub fn with_related(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.related = Some((location, message.into()));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display. Locations in
    /// files the map never loaded are reported through notes instead.
    pub fn to_diagnostic(&self, sources: &SourceMap) -> Diagnostic<usize> {
        let mut labels = Vec::new();
        let mut notes = Vec::new();
        match sources.line_span(&self.location) {
            Some((id, span)) => labels.push(Label::primary(id, span)),
            None => notes.push(format!("at {}", self.location)),
        }
        if let Some((location, message)) = &self.related {
            match sources.line_span(location) {
                Some((id, span)) => labels.push(Label::secondary(id, span).with_message(message)),
                None => notes.push(format!("{message} at {location}")),
            }
        }
        notes.extend(self.notes.iter().cloned());
        Diagnostic::error()
            .with_code(self.kind.name())
            .with_message(&self.message)
            .with_labels(labels)
            .with_notes(notes)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.kind, self.message)
    }
}

impl std::error::Error for ParseError {}
