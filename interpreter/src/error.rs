use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use tiel::location::SourceLocation;
use tiel::parser::{ErrorKind, ExpressionError, ParseError};
use tiel::source::SourceMap;

#[derive(Debug)]
pub enum RuntimeError {
    UndefinedVariable(String),
    UndefinedFunction(String),
    UndefinedMacro(String),
    ReservedName(String),
    MacroRedefined(String),
    TypeError { expected: String, got: String },
    NotCallable(String),
    InvalidCondition(String),
    ArgumentCount { function: String, expected: String, got: usize },
    IndexOutOfBounds { index: i64, len: usize },
    DivisionByZero,
    Overflow,
    TooLarge(usize),
    ZeroStep,
    StackOverflow,
    Expression(ExpressionError),
    NoMatchingPattern { name: String, arguments: String },
    UnexpectedSection { name: String, section: String },
    ExpansionDepth(usize),
    Structure(ParseError),
    Custom(String),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::UndefinedVariable(_)
            | RuntimeError::UndefinedFunction(_)
            | RuntimeError::UndefinedMacro(_)
            | RuntimeError::ReservedName(_)
            | RuntimeError::MacroRedefined(_) => ErrorKind::Name,
            RuntimeError::TypeError { .. }
            | RuntimeError::NotCallable(_)
            | RuntimeError::InvalidCondition(_) => ErrorKind::Type,
            RuntimeError::ArgumentCount { .. }
            | RuntimeError::IndexOutOfBounds { .. }
            | RuntimeError::DivisionByZero
            | RuntimeError::Overflow
            | RuntimeError::TooLarge(_)
            | RuntimeError::ZeroStep
            | RuntimeError::StackOverflow
            | RuntimeError::Custom(_) => ErrorKind::Eval,
            RuntimeError::Expression(_) => ErrorKind::Syntax,
            RuntimeError::NoMatchingPattern { .. } | RuntimeError::UnexpectedSection { .. } => {
                ErrorKind::MacroMatch
            }
            RuntimeError::ExpansionDepth(_) => ErrorKind::ExpansionDepth,
            RuntimeError::Structure(error) => error.kind,
        }
    }

    pub fn at(self, location: SourceLocation) -> DiagnosticError {
        DiagnosticError {
            error: self,
            location,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::UndefinedVariable(name) => write!(f, "undefined variable `{name}`"),
            RuntimeError::UndefinedFunction(name) => write!(f, "undefined function `{name}`"),
            RuntimeError::UndefinedMacro(name) => write!(f, "macro `{name}` is not defined"),
            RuntimeError::ReservedName(name) => write!(f, "`{name}` is a reserved name"),
            RuntimeError::MacroRedefined(name) => write!(f, "macro `{name}` is already defined"),
            RuntimeError::TypeError { expected, got } => write!(f, "expected {expected}, got {got}"),
            RuntimeError::NotCallable(name) => write!(f, "`{name}` is not a function"),
            RuntimeError::InvalidCondition(got) => {
                write!(f, "condition must be a Bool or a number, got {got}")
            }
            RuntimeError::ArgumentCount { function, expected, got } => {
                write!(f, "`{function}` takes {expected} argument(s), got {got}")
            }
            RuntimeError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::Overflow => write!(f, "integer overflow"),
            RuntimeError::TooLarge(limit) => write!(f, "result would exceed {limit} elements"),
            RuntimeError::ZeroStep => write!(f, "loop step must not be zero"),
            RuntimeError::StackOverflow => write!(f, "function call depth exceeded"),
            RuntimeError::Expression(error) => write!(f, "invalid expression: {error}"),
            RuntimeError::NoMatchingPattern { name, arguments } => {
                write!(f, "no pattern of `{name}` matches `{arguments}`")
            }
            RuntimeError::UnexpectedSection { name, section } => {
                write!(f, "unexpected section `{section}` in call of `{name}`")
            }
            RuntimeError::ExpansionDepth(limit) => {
                write!(f, "macro expansion nested deeper than {limit} levels")
            }
            RuntimeError::Structure(error) => write!(f, "{}", error.message),
            RuntimeError::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// A runtime error attached to the (mapped) line that raised it.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    pub location: SourceLocation,
}

impl DiagnosticError {
    pub fn to_diagnostic(&self, sources: &SourceMap) -> Diagnostic<usize> {
        if let RuntimeError::Structure(error) = &self.error {
            return error.to_diagnostic(sources);
        }
        let diagnostic = Diagnostic::error()
            .with_code(self.error.kind().name())
            .with_message(self.error.to_string());
        match sources.line_span(&self.location) {
            Some((id, span)) => diagnostic.with_labels(vec![Label::primary(id, span)]),
            None => diagnostic.with_notes(vec![format!("at {}", self.location)]),
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.error.kind(), self.error)
    }
}

impl std::error::Error for DiagnosticError {}

/// Any fatal preprocessing error.
#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Runtime(DiagnosticError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(error) => error.kind,
            Error::Runtime(error) => error.error.kind(),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Error::Parse(error) => &error.location,
            Error::Runtime(error) => &error.location,
        }
    }

    pub fn to_diagnostic(&self, sources: &SourceMap) -> Diagnostic<usize> {
        match self {
            Error::Parse(error) => error.to_diagnostic(sources),
            Error::Runtime(error) => error.to_diagnostic(sources),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::Parse(error)
    }
}

impl From<DiagnosticError> for Error {
    fn from(error: DiagnosticError) -> Self {
        Error::Runtime(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(error) => error.fmt(f),
            Error::Runtime(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {}
