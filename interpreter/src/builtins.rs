use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::evaluator::{MAX_VALUE_LEN, type_error};
use crate::runtime_value::RuntimeValue;

/// Names of the built-in functions. User bindings of the same name shadow them.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "defined", "float", "int", "join", "len", "lower", "max", "min", "range", "str", "upper",
];

/// Call a built-in function by name.
///
/// Returns `None` if `name` is not a built-in, so the caller can report an
/// undefined function.
pub fn call_builtin(
    name: &str,
    args: Vec<RuntimeValue>,
    env: &Environment,
) -> Option<Result<RuntimeValue, RuntimeError>> {
    // Inner function returns Result<Option<RuntimeValue>, RuntimeError>;
    // `.transpose()` turns that into the Option<Result<..>> callers want.
    fn inner(name: &str, mut args: Vec<RuntimeValue>, env: &Environment) -> Result<Option<RuntimeValue>, RuntimeError> {
        Ok(Some(match name {
            // ── Conversions ─────────────────────────────────────────────────
            "str" => {
                arity(name, &args, 1, 1)?;
                RuntimeValue::String(args[0].to_string())
            }
            "int" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    RuntimeValue::Integer(n) => RuntimeValue::Integer(*n),
                    RuntimeValue::Float(x) if x.is_finite() => RuntimeValue::Integer(x.trunc() as i64),
                    RuntimeValue::Boolean(b) => RuntimeValue::Integer(i64::from(*b)),
                    RuntimeValue::String(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(RuntimeValue::Integer)
                        .map_err(|_| RuntimeError::Custom(format!("cannot convert {s:?} to Int")))?,
                    other => return Err(type_error("a number or Str", other)),
                }
            }
            "float" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    RuntimeValue::String(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(RuntimeValue::Float)
                        .map_err(|_| RuntimeError::Custom(format!("cannot convert {s:?} to Float")))?,
                    other => RuntimeValue::Float(other.as_f64().ok_or_else(|| type_error("a number or Str", other))?),
                }
            }

            // ── Numbers ─────────────────────────────────────────────────────
            "abs" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    RuntimeValue::Integer(n) => {
                        RuntimeValue::Integer(n.checked_abs().ok_or(RuntimeError::Overflow)?)
                    }
                    RuntimeValue::Float(x) => RuntimeValue::Float(x.abs()),
                    other => return Err(type_error("a number", other)),
                }
            }
            "min" | "max" => {
                let items = if matches!(args.as_slice(), [RuntimeValue::Sequence(_)]) {
                    match args.pop() {
                        Some(RuntimeValue::Sequence(items)) => items,
                        _ => Vec::new(),
                    }
                } else {
                    args
                };
                extremum(name, items)?
            }
            "range" => {
                arity(name, &args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|a| a.as_integer().ok_or_else(|| type_error("Int", a)))
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match *ints.as_slice() {
                    [] => (0, 0, 1),
                    [stop] => (0, stop, 1),
                    [start, stop] => (start, stop, 1),
                    [start, stop, step, ..] => (start, stop, step),
                };
                RuntimeValue::Sequence(range(start, stop, step)?.into_iter().map(RuntimeValue::Integer).collect())
            }

            // ── Strings and sequences ───────────────────────────────────────
            "len" => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    RuntimeValue::String(s) => RuntimeValue::Integer(s.chars().count() as i64),
                    RuntimeValue::Sequence(items) => RuntimeValue::Integer(items.len() as i64),
                    other => return Err(type_error("Str or Sequence", other)),
                }
            }
            "upper" | "lower" => {
                arity(name, &args, 1, 1)?;
                let RuntimeValue::String(s) = &args[0] else {
                    return Err(type_error("Str", &args[0]));
                };
                RuntimeValue::String(if name == "upper" { s.to_uppercase() } else { s.to_lowercase() })
            }
            "join" => {
                arity(name, &args, 2, 2)?;
                let (RuntimeValue::String(separator), RuntimeValue::Sequence(items)) = (&args[0], &args[1]) else {
                    return Err(RuntimeError::TypeError {
                        expected: "Str and Sequence".to_string(),
                        got: format!("{} and {}", args[0].type_name(), args[1].type_name()),
                    });
                };
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                RuntimeValue::String(parts.join(separator))
            }

            // ── Environment ─────────────────────────────────────────────────
            "defined" => {
                arity(name, &args, 1, 1)?;
                let RuntimeValue::String(variable) = &args[0] else {
                    return Err(type_error("Str", &args[0]));
                };
                RuntimeValue::Boolean(env.is_defined(variable))
            }

            _ => return Ok(None),
        }))
    }

    if !BUILTIN_FUNCTIONS.contains(&name) {
        return None;
    }
    inner(name, args, env).transpose()
}

fn arity(name: &str, args: &[RuntimeValue], min: usize, max: usize) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max { min.to_string() } else { format!("{min} to {max}") };
    Err(RuntimeError::ArgumentCount {
        function: name.to_string(),
        expected,
        got: args.len(),
    })
}

fn extremum(name: &str, items: Vec<RuntimeValue>) -> Result<RuntimeValue, RuntimeError> {
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(RuntimeError::ArgumentCount {
            function: name.to_string(),
            expected: "at least 1".to_string(),
            got: 0,
        });
    };
    for item in iter {
        let (Some(a), Some(b)) = (item.as_f64(), best.as_f64()) else {
            return Err(type_error("numbers", if item.as_f64().is_none() { &item } else { &best }));
        };
        if (name == "max" && a > b) || (name == "min" && a < b) {
            best = item;
        }
    }
    Ok(best)
}

/// Half-open integer range with a nonzero step.
pub fn range(start: i64, stop: i64, step: i64) -> Result<Vec<i64>, RuntimeError> {
    if step == 0 {
        return Err(RuntimeError::ZeroStep);
    }
    let span = i128::from(stop) - i128::from(start);
    let step_wide = i128::from(step);
    let count = if (span > 0) == (step > 0) && span != 0 {
        (span.abs() + step_wide.abs() - 1) / step_wide.abs()
    } else {
        0
    };
    if count > MAX_VALUE_LEN as i128 {
        return Err(RuntimeError::TooLarge(MAX_VALUE_LEN));
    }
    Ok((0..count as i64).map(|k| start + k * step).collect())
}
