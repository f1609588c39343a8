#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// -x
    Negation,
    /// +x
    Identity,
    /// not x, !x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    FloorDivision,
    Modulo,
    Power,
    LogicalAnd,
    LogicalOr,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Membership,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    SequenceLiteral(Vec<Expr>),

    Variable(String),
    Call {
        callee: String,
        arguments: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// cond ? a : b
    Conditional {
        condition: Box<Expr>,
        true_branch: Box<Expr>,
        false_branch: Box<Expr>,
    },
}
