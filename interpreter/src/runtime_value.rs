use std::fmt;
use std::rc::Rc;

/// A runtime value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Sequence(Vec<RuntimeValue>),
    Function(Rc<Function>),
}

/// A function bound by `let NAME(PARAMS) = EXPR`. Free names in the body
/// are resolved when the function is called.
#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

impl RuntimeValue {
    /// Boolean value for conditions. Numbers are true when nonzero; other
    /// types have no truth value.
    pub fn truth(&self) -> Option<bool> {
        match self {
            RuntimeValue::Boolean(b) => Some(*b),
            RuntimeValue::Integer(n) => Some(*n != 0),
            RuntimeValue::Float(x) => Some(*x != 0.0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RuntimeValue::Integer(n) => Some(*n as f64),
            RuntimeValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Integer value, accepting floats with no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RuntimeValue::Integer(n) => Some(*n),
            RuntimeValue::Float(x) if x.fract() == 0.0 && x.abs() < 9.2e18 => Some(*x as i64),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Integer(_) => "Int",
            RuntimeValue::Float(_) => "Float",
            RuntimeValue::Boolean(_) => "Bool",
            RuntimeValue::String(_) => "Str",
            RuntimeValue::Sequence(_) => "Sequence",
            RuntimeValue::Function(_) => "Callable",
        }
    }

    /// How the value looks inside a rendered sequence.
    fn fmt_item(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::String(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Integer(n) => write!(f, "{n}"),
            RuntimeValue::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            RuntimeValue::Boolean(b) => write!(f, "{b}"),
            RuntimeValue::String(s) => write!(f, "{s}"),
            RuntimeValue::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_item(f)?;
                }
                write!(f, "]")
            }
            RuntimeValue::Function(function) => write!(f, "<function {}>", function.name),
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Integer(a), RuntimeValue::Integer(b)) => a == b,
            (RuntimeValue::Boolean(a), RuntimeValue::Boolean(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Sequence(a), RuntimeValue::Sequence(b)) => a == b,
            (RuntimeValue::Function(a), RuntimeValue::Function(b)) => Rc::ptr_eq(a, b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y, // NaN != NaN per IEEE 754
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(RuntimeValue::Integer(-3).to_string(), "-3");
        assert_eq!(RuntimeValue::Float(3.0).to_string(), "3.0");
        assert_eq!(RuntimeValue::Float(2.5).to_string(), "2.5");
        assert_eq!(RuntimeValue::Boolean(true).to_string(), "true");
        let seq = RuntimeValue::Sequence(vec![
            RuntimeValue::Integer(1),
            RuntimeValue::String("a".into()),
        ]);
        assert_eq!(seq.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn numbers_compare_across_types() {
        assert_eq!(RuntimeValue::Integer(2), RuntimeValue::Float(2.0));
        assert_ne!(RuntimeValue::Integer(2), RuntimeValue::String("2".into()));
        assert_ne!(RuntimeValue::Boolean(true), RuntimeValue::Integer(1));
    }

    #[test]
    fn truth_is_only_defined_for_bool_and_numbers() {
        assert_eq!(RuntimeValue::Integer(0).truth(), Some(false));
        assert_eq!(RuntimeValue::Float(0.5).truth(), Some(true));
        assert_eq!(RuntimeValue::String("x".into()).truth(), None);
    }
}
