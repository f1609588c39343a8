pub mod block;
pub mod expression;
pub mod location;
pub mod parser;
pub mod source;

use crate::block::Node;

/// A fully resolved preprocessor program: every include spliced, every
/// directive block matched with its terminator.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nodes: Vec<Node>,
    /// The root source's last line has no line terminator.
    pub missing_final_newline: bool,
}
