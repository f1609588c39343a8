use std::rc::Rc;

use tiel::expression::{BinaryOperator, Expr, UnaryOperator};
use tiel::parser::parse_expression;

use crate::builtins;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::runtime_value::{Function, RuntimeValue};

const MAX_DEPTH: usize = 256;
/// Longest string (in bytes) or sequence an operator may build.
pub const MAX_VALUE_LEN: usize = 1 << 24;

/// Turns expression text into a value. The environment holds one and calls
/// it for every condition, binding, loop bound and inline expression.
pub trait Evaluator {
    fn evaluate(&self, text: &str, env: &mut Environment) -> Result<RuntimeValue, RuntimeError>;
}

/// The built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluator;

impl Evaluator for StandardEvaluator {
    fn evaluate(&self, text: &str, env: &mut Environment) -> Result<RuntimeValue, RuntimeError> {
        let expr = parse_expression(text).map_err(RuntimeError::Expression)?;
        evaluate(&expr, env, 0)
    }
}

/// Evaluate an expression AST node.
pub fn evaluate(expr: &Expr, env: &mut Environment, depth: usize) -> Result<RuntimeValue, RuntimeError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::StackOverflow);
    }

    match expr {
        // --- Literals ---
        Expr::IntegerLiteral(n) => Ok(RuntimeValue::Integer(*n)),
        Expr::FloatLiteral(x) => Ok(RuntimeValue::Float(*x)),
        Expr::StringLiteral(s) => Ok(RuntimeValue::String(s.clone())),
        Expr::BooleanLiteral(b) => Ok(RuntimeValue::Boolean(*b)),
        Expr::SequenceLiteral(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, env, depth))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RuntimeValue::Sequence(values))
        }

        Expr::Variable(name) => env.lookup(name),

        Expr::Call { callee, arguments } => {
            let args = arguments
                .iter()
                .map(|arg| evaluate(arg, env, depth))
                .collect::<Result<Vec<_>, _>>()?;
            call(callee, args, env, depth)
        }

        Expr::Index { target, index } => {
            let target = evaluate(target, env, depth)?;
            let index = evaluate(index, env, depth)?;
            evaluate_index(target, index)
        }

        // --- Operations ---
        Expr::UnaryOperation { operator, operand } => {
            let value = evaluate(operand, env, depth)?;
            evaluate_unary(*operator, value)
        }

        Expr::BinaryOperation { operator, left, right } => {
            let left = evaluate(left, env, depth)?;
            if let Some(result) = short_circuit(*operator, &left)? {
                return Ok(RuntimeValue::Boolean(result));
            }
            let right = evaluate(right, env, depth)?;
            evaluate_binary(*operator, left, right)
        }

        // --- Control flow ---
        Expr::Conditional { condition: test, true_branch, false_branch } => {
            if condition(&evaluate(test, env, depth)?)? {
                evaluate(true_branch, env, depth)
            } else {
                evaluate(false_branch, env, depth)
            }
        }
    }
}

/// Truth value of a condition result.
pub fn condition(value: &RuntimeValue) -> Result<bool, RuntimeError> {
    value
        .truth()
        .ok_or_else(|| RuntimeError::InvalidCondition(value.type_name().to_string()))
}

fn call(
    callee: &str,
    args: Vec<RuntimeValue>,
    env: &mut Environment,
    depth: usize,
) -> Result<RuntimeValue, RuntimeError> {
    match env.lookup(callee) {
        Ok(RuntimeValue::Function(function)) => call_function(&function, args, env, depth),
        Ok(_) => Err(RuntimeError::NotCallable(callee.to_string())),
        Err(_) => builtins::call_builtin(callee, args, env)
            .unwrap_or_else(|| Err(RuntimeError::UndefinedFunction(callee.to_string()))),
    }
}

fn call_function(
    function: &Rc<Function>,
    args: Vec<RuntimeValue>,
    env: &mut Environment,
    depth: usize,
) -> Result<RuntimeValue, RuntimeError> {
    if args.len() != function.params.len() {
        return Err(RuntimeError::ArgumentCount {
            function: function.name.clone(),
            expected: function.params.len().to_string(),
            got: args.len(),
        });
    }
    let body = parse_expression(&function.body).map_err(RuntimeError::Expression)?;
    env.push_scope();
    let result = function
        .params
        .iter()
        .zip(args)
        .try_for_each(|(param, arg)| env.bind_local(param, arg))
        .and_then(|()| evaluate(&body, env, depth + 1));
    env.pop_scope();
    result
}

fn evaluate_index(target: RuntimeValue, index: RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    let Some(i) = index.as_integer() else {
        return Err(type_error("Int index", &index));
    };
    let resolve = |len: usize| -> Result<usize, RuntimeError> {
        let position = if i < 0 { i + len as i64 } else { i };
        if position < 0 || position >= len as i64 {
            Err(RuntimeError::IndexOutOfBounds { index: i, len })
        } else {
            Ok(position as usize)
        }
    };
    match target {
        RuntimeValue::Sequence(mut items) => {
            let position = resolve(items.len())?;
            Ok(items.swap_remove(position))
        }
        RuntimeValue::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let position = resolve(chars.len())?;
            Ok(RuntimeValue::String(chars[position].to_string()))
        }
        other => Err(type_error("Sequence or Str", &other)),
    }
}

fn evaluate_unary(operator: UnaryOperator, value: RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match (operator, value) {
        (UnaryOperator::LogicalNot, value) => Ok(RuntimeValue::Boolean(!condition(&value)?)),
        (UnaryOperator::Negation, RuntimeValue::Integer(n)) => {
            n.checked_neg().map(RuntimeValue::Integer).ok_or(RuntimeError::Overflow)
        }
        (UnaryOperator::Negation, RuntimeValue::Float(x)) => Ok(RuntimeValue::Float(-x)),
        (UnaryOperator::Identity, value @ (RuntimeValue::Integer(_) | RuntimeValue::Float(_))) => Ok(value),
        (_, value) => Err(type_error("a number", &value)),
    }
}

/// The result of `and`/`or` when the left operand alone decides it.
fn short_circuit(operator: BinaryOperator, left: &RuntimeValue) -> Result<Option<bool>, RuntimeError> {
    Ok(match operator {
        BinaryOperator::LogicalAnd if !condition(left)? => Some(false),
        BinaryOperator::LogicalOr if condition(left)? => Some(true),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy)]
enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
}

fn evaluate_binary(
    operator: BinaryOperator,
    left: RuntimeValue,
    right: RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    use RuntimeValue::Boolean;

    let arithmetic = match operator {
        BinaryOperator::Equality => return Ok(Boolean(left == right)),
        BinaryOperator::Inequality => return Ok(Boolean(left != right)),
        BinaryOperator::Membership => return membership(&left, &right).map(Boolean),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => return compare(operator, &left, &right).map(Boolean),
        // The left operand did not decide the result.
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => return condition(&right).map(Boolean),
        BinaryOperator::Addition => Arithmetic::Add,
        BinaryOperator::Subtraction => Arithmetic::Subtract,
        BinaryOperator::Multiplication => Arithmetic::Multiply,
        BinaryOperator::Division => Arithmetic::Divide,
        BinaryOperator::FloorDivision => Arithmetic::FloorDivide,
        BinaryOperator::Modulo => Arithmetic::Modulo,
        BinaryOperator::Power => Arithmetic::Power,
    };
    evaluate_arithmetic(arithmetic, left, right)
}

fn evaluate_arithmetic(
    operator: Arithmetic,
    left: RuntimeValue,
    right: RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    use RuntimeValue::{Float, Integer, Sequence, String as Str};

    match (operator, left, right) {
        // Integer arithmetic stays exact.
        (Arithmetic::Add, Integer(a), Integer(b)) => checked(a.checked_add(b)),
        (Arithmetic::Subtract, Integer(a), Integer(b)) => checked(a.checked_sub(b)),
        (Arithmetic::Multiply, Integer(a), Integer(b)) => checked(a.checked_mul(b)),
        (Arithmetic::Divide, Integer(a), Integer(b)) => {
            if b == 0 {
                Err(RuntimeError::DivisionByZero)
            } else if a % b == 0 {
                checked(a.checked_div(b))
            } else {
                Ok(Float(a as f64 / b as f64))
            }
        }
        (Arithmetic::FloorDivide, Integer(a), Integer(b)) => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            checked(a.checked_div_euclid(b).map(|q| if b < 0 && a.rem_euclid(b) != 0 { q - 1 } else { q }))
        }
        (Arithmetic::Modulo, Integer(a), Integer(b)) => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            // Result takes the sign of the divisor.
            let r = a.wrapping_rem(b);
            Ok(Integer(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        (Arithmetic::Power, Integer(a), Integer(b)) if b >= 0 => {
            let exponent = u32::try_from(b).map_err(|_| RuntimeError::Overflow)?;
            checked(a.checked_pow(exponent))
        }

        // Repetition and concatenation.
        (Arithmetic::Add, Str(a), Str(b)) => {
            within_limit(a.len().saturating_add(b.len()))?;
            Ok(Str(a + &b))
        }
        (Arithmetic::Add, Sequence(mut a), Sequence(b)) => {
            within_limit(a.len().saturating_add(b.len()))?;
            a.extend(b);
            Ok(Sequence(a))
        }
        (Arithmetic::Multiply, Str(s), Integer(n)) | (Arithmetic::Multiply, Integer(n), Str(s)) => {
            let times = repetitions(s.len(), n)?;
            Ok(Str(s.repeat(times)))
        }
        (Arithmetic::Multiply, Sequence(items), Integer(n)) | (Arithmetic::Multiply, Integer(n), Sequence(items)) => {
            let times = repetitions(items.len(), n)?;
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Ok(Sequence(out))
        }

        // Mixed or float arithmetic.
        (operator, left, right) => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(RuntimeError::TypeError {
                    expected: "operands of matching types".to_string(),
                    got: format!("{} and {}", left.type_name(), right.type_name()),
                });
            };
            let value = match operator {
                Arithmetic::Add => a + b,
                Arithmetic::Subtract => a - b,
                Arithmetic::Multiply => a * b,
                Arithmetic::Power => a.powf(b),
                Arithmetic::Divide | Arithmetic::FloorDivide | Arithmetic::Modulo if b == 0.0 => {
                    return Err(RuntimeError::DivisionByZero);
                }
                Arithmetic::Divide => a / b,
                Arithmetic::FloorDivide => (a / b).floor(),
                Arithmetic::Modulo => a - b * (a / b).floor(),
            };
            Ok(Float(value))
        }
    }
}

fn within_limit(len: usize) -> Result<(), RuntimeError> {
    if len > MAX_VALUE_LEN {
        return Err(RuntimeError::TooLarge(MAX_VALUE_LEN));
    }
    Ok(())
}

/// Repetition count for `len`-sized text or sequences. Negative counts
/// repeat zero times.
fn repetitions(len: usize, n: i64) -> Result<usize, RuntimeError> {
    let times = usize::try_from(n).unwrap_or(0);
    within_limit(len.checked_mul(times).unwrap_or(usize::MAX))?;
    Ok(times)
}

fn checked(value: Option<i64>) -> Result<RuntimeValue, RuntimeError> {
    value.map(RuntimeValue::Integer).ok_or(RuntimeError::Overflow)
}

fn compare(operator: BinaryOperator, left: &RuntimeValue, right: &RuntimeValue) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (RuntimeValue::String(a), RuntimeValue::String(b)) => Some(a.cmp(b)),
        (RuntimeValue::Integer(a), RuntimeValue::Integer(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(RuntimeError::TypeError {
                    expected: "comparable operands".to_string(),
                    got: format!("{} and {}", left.type_name(), right.type_name()),
                });
            }
        },
    };
    // NaN compares false in every direction.
    let Some(ordering) = ordering else { return Ok(false) };
    Ok(match operator {
        BinaryOperator::LessThan => ordering == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOperator::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn membership(needle: &RuntimeValue, haystack: &RuntimeValue) -> Result<bool, RuntimeError> {
    match (needle, haystack) {
        (_, RuntimeValue::Sequence(items)) => Ok(items.contains(needle)),
        (RuntimeValue::String(a), RuntimeValue::String(b)) => Ok(b.contains(a.as_str())),
        (_, other) => Err(type_error("Sequence or Str", other)),
    }
}

pub(crate) fn type_error(expected: &str, got: &RuntimeValue) -> RuntimeError {
    RuntimeError::TypeError {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}
