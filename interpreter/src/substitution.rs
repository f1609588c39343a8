use std::str::FromStr;

use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::evaluator::MAX_VALUE_LEN;

/// Delimiters of inline expression markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InlineStyle {
    /// `` `expr` ``
    #[default]
    Backtick,
    /// `<expr>`
    Angle,
}

impl InlineStyle {
    fn delimiters(self) -> (char, char) {
        match self {
            InlineStyle::Backtick => ('`', '`'),
            InlineStyle::Angle => ('<', '>'),
        }
    }
}

impl FromStr for InlineStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backtick" => Ok(InlineStyle::Backtick),
            "angle" => Ok(InlineStyle::Angle),
            other => Err(format!("unknown inline style `{other}` (expected backtick or angle)")),
        }
    }
}

/// First non-blank character of a host-language comment line.
const COMMENT_MARKER: char = '!';

/// Rewrite the inline markers of one plain line: `$name` markers, then
/// expression markers, then index markers. Comment lines are left alone.
pub fn substitute(text: &str, style: InlineStyle, env: &mut Environment) -> Result<String, RuntimeError> {
    if text.trim_start().starts_with(COMMENT_MARKER) {
        return Ok(text.to_string());
    }
    let text = substitute_names(text, env)?;
    let text = substitute_expressions(&text, style, env)?;
    substitute_index(&text, env)
}

/// `$name`, with optional blanks after the `$`, becomes the value of `name`.
fn substitute_names(text: &str, env: &Environment) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let name_start = after.trim_start();
        let len = identifier_len(name_start);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        out.push_str(&env.lookup(&name_start[..len])?.to_string());
        rest = &name_start[len..];
    }

    out.push_str(rest);
    Ok(out)
}

fn substitute_expressions(text: &str, style: InlineStyle, env: &mut Environment) -> Result<String, RuntimeError> {
    let (open, close) = style.delimiters();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        let after = &rest[start + open.len_utf8()..];
        let Some(len) = after.find(close) else { break };
        let expression = &after[..len];

        // `<` inside an angle marker means the outer `<` was plain text.
        if expression.trim().is_empty() || (open != close && expression.contains(open)) {
            out.push_str(&rest[..start + open.len_utf8()]);
            rest = after;
            continue;
        }

        out.push_str(&rest[..start]);
        out.push_str(&env.evaluate(expression)?.to_string());
        rest = &after[len + close.len_utf8()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// `@:` / `@name`, optionally followed by blanks and `,`, repeated
/// `__INDEX__` times.
fn substitute_index(text: &str, env: &Environment) -> Result<String, RuntimeError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let token_len = marker_token_len(after);
        if token_len == 0 {
            out.push('@');
            rest = after;
            continue;
        }

        let token = &after[..token_len];
        let tail = &after[token_len..];
        let blanks = tail.len() - tail.trim_start_matches([' ', '\t']).len();
        let has_separator = tail[blanks..].starts_with(',');

        let count = env
            .index()
            .ok_or_else(|| RuntimeError::UndefinedVariable("__INDEX__".to_string()))?;
        let count = usize::try_from(count).unwrap_or(0);
        if token.len().saturating_add(2).saturating_mul(count) > MAX_VALUE_LEN {
            return Err(RuntimeError::TooLarge(MAX_VALUE_LEN));
        }
        let repeated = if has_separator {
            vec![format!("{token},"); count].join(" ")
        } else {
            token.repeat(count)
        };
        out.push_str(&repeated);
        rest = if has_separator { &tail[blanks + 1..] } else { tail };
    }

    out.push_str(rest);
    Ok(out)
}

/// Length of the `:` or identifier directly after an `@`, or 0.
fn marker_token_len(text: &str) -> usize {
    if text.starts_with(':') {
        return 1;
    }
    identifier_len(text)
}

/// Length of the ASCII identifier at the start of `text`, or 0.
fn identifier_len(text: &str) -> usize {
    match text.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len()),
        _ => 0,
    }
}
