pub mod macro_def;

use crate::location::SourceLocation;

pub use macro_def::{MacroDef, MacroPattern, MacroSection};

/// A node of the resolved directive tree. Expressions are kept as source
/// text and handed to the evaluator when the node runs.
#[derive(Debug, Clone)]
pub enum Node {
    /// A non-directive line, emitted after inline substitution.
    Plain {
        text: String,
        location: SourceLocation,
    },
    If(IfNode),
    Do(DoNode),
    Let(LetNode),
    Undef {
        names: Vec<String>,
        location: SourceLocation,
    },
    /// `line N ["file"]`
    LineMarker {
        line: u32,
        file: Option<String>,
        location: SourceLocation,
    },
    MacroDef(MacroDef),
    Call(MacroCall),
}

impl Node {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Node::Plain { location, .. }
            | Node::Undef { location, .. }
            | Node::LineMarker { location, .. } => location,
            Node::If(node) => &node.location,
            Node::Do(node) => &node.location,
            Node::Let(node) => &node.location,
            Node::MacroDef(def) => &def.location,
            Node::Call(call) => &call.location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IfNode {
    pub branches: Vec<Branch>,
    pub else_body: Option<Vec<Node>>,
    pub location: SourceLocation,
}

/// An `if` or `else if` arm.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: String,
    pub body: Vec<Node>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct DoNode {
    pub variable: String,
    pub first: String,
    pub last: String,
    pub step: Option<String>,
    pub body: Vec<Node>,
    pub location: SourceLocation,
}

/// `let NAME = EXPR` or `let NAME(PARAMS) = EXPR`.
#[derive(Debug, Clone)]
pub struct LetNode {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub expression: String,
    pub location: SourceLocation,
}

/// An invocation of a user macro. Construct invocations carry a body and
/// any sections opened inside it.
#[derive(Debug, Clone)]
pub struct MacroCall {
    pub name: String,
    pub arguments: String,
    /// Whitespace before the invocation's marker.
    pub indent: String,
    pub body: Vec<Node>,
    pub sections: Vec<CallSection>,
    pub location: SourceLocation,
    /// Invoked from a `use`d file: expanded for its definitions only.
    pub silent: bool,
}

#[derive(Debug, Clone)]
pub struct CallSection {
    pub name: String,
    pub arguments: String,
    pub body: Vec<Node>,
    pub location: SourceLocation,
}
