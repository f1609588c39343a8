//! Argument parsers for the built-in directives.

use std::collections::HashSet;

use crate::block::LetNode;
use crate::location::SourceLocation;
use crate::parser::error::ParseError;
use crate::parser::expression::split_top_level;
use crate::parser::lexer::{is_identifier, leading_word};

/// Directive names that cannot be taken by user macros.
pub const BUILTIN_DIRECTIVES: &[&str] = &[
    "let", "undef", "del", "if", "elseif", "else", "endif", "do", "enddo", "include", "use",
    "import", "line", "macro", "pattern", "section", "finally", "endmacro",
];

pub fn is_builtin_directive(name: &str) -> bool {
    BUILTIN_DIRECTIVES.contains(&name) || name.chars().all(|c| c.is_ascii_digit())
}

/// `NAME = EXPR` or `NAME(P1, P2) = EXPR`
pub fn parse_let(args: &str, location: &SourceLocation) -> Result<LetNode, ParseError> {
    let usage = || ParseError::syntax("expected `let NAME = EXPR` or `let NAME(ARGS) = EXPR`", location.clone());

    let (name, rest) = leading_word(args.trim());
    if !is_identifier(name) {
        return Err(usage());
    }
    let mut rest = rest.trim_start();

    let params = match rest.strip_prefix('(') {
        Some(inner) => {
            let close = inner.find(')').ok_or_else(usage)?;
            let list = inner[..close].trim();
            rest = inner[close + 1..].trim_start();
            let params: Vec<String> = if list.is_empty() {
                Vec::new()
            } else {
                list.split(',').map(|p| p.trim().to_string()).collect()
            };
            let mut seen = HashSet::new();
            for param in &params {
                if !is_identifier(param) {
                    return Err(ParseError::syntax(format!("invalid parameter name `{param}`"), location.clone()));
                }
                if !seen.insert(param.as_str()) {
                    return Err(ParseError::syntax(
                        format!("parameter `{param}` of `{name}` is repeated"),
                        location.clone(),
                    ));
                }
            }
            Some(params)
        }
        None => None,
    };

    let expression = rest.strip_prefix('=').ok_or_else(usage)?.trim();
    if expression.is_empty() || expression.starts_with('=') {
        return Err(usage());
    }

    Ok(LetNode {
        name: name.to_string(),
        params,
        expression: expression.to_string(),
        location: location.clone(),
    })
}

/// Comma-separated identifiers for `undef`.
pub fn parse_names(args: &str, location: &SourceLocation) -> Result<Vec<String>, ParseError> {
    let names: Vec<String> = args.split(',').map(|n| n.trim().to_string()).collect();
    if let Some(bad) = names.iter().find(|n| !is_identifier(n)) {
        return Err(ParseError::syntax(
            if bad.is_empty() {
                "expected a comma-separated list of names".to_string()
            } else {
                format!("invalid name `{bad}`")
            },
            location.clone(),
        ));
    }
    Ok(names)
}

/// The condition of `if`/`else if`, without an optional trailing `then`.
pub fn parse_condition(directive: &str, args: &str, location: &SourceLocation) -> Result<String, ParseError> {
    let mut condition = args.trim();
    let lower = condition.to_ascii_lowercase();
    if let Some(head) = lower.strip_suffix("then") {
        if head.is_empty() || head.ends_with(|c: char| c.is_whitespace() || c == ')') {
            condition = condition[..head.len()].trim_end();
        }
    }
    if condition.is_empty() {
        return Err(ParseError::syntax(format!("`{directive}` needs a condition"), location.clone()));
    }
    Ok(condition.to_string())
}

/// Loop header pieces: `VAR = FIRST, LAST[, STEP]`.
pub struct DoHeader {
    pub variable: String,
    pub first: String,
    pub last: String,
    pub step: Option<String>,
}

pub fn parse_do(args: &str, location: &SourceLocation) -> Result<DoHeader, ParseError> {
    let usage = || ParseError::syntax("expected `do VAR = FIRST, LAST[, STEP]`", location.clone());

    let (variable, rest) = leading_word(args.trim());
    if !is_identifier(variable) {
        return Err(usage());
    }
    let bounds = rest.trim_start().strip_prefix('=').ok_or_else(usage)?;
    let bounds = bounds.trim().trim_end_matches(':');
    let parts: Vec<&str> = split_top_level(bounds, ',').into_iter().map(str::trim).collect();
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
        return Err(usage());
    }

    Ok(DoHeader {
        variable: variable.to_string(),
        first: parts[0].to_string(),
        last: parts[1].to_string(),
        step: parts.get(2).map(|s| s.to_string()),
    })
}

/// `line N ["file"]`, or the bare `N ["file"]` form whose directive name is
/// the number. Trailing flag digits after the file name are ignored.
pub fn parse_line(name: &str, args: &str, location: &SourceLocation) -> Result<(u32, Option<String>), ParseError> {
    let usage = || ParseError::syntax("expected `line NUMBER [\"FILE\"]`", location.clone());

    let (number, rest) = if name == "line" {
        leading_word(args.trim())
    } else {
        (name, args)
    };
    let line: u32 = number.parse().map_err(|_| usage())?;
    if line == 0 {
        return Err(ParseError::syntax("line numbers start at 1", location.clone()));
    }

    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((line, None));
    }
    let inner = rest.strip_prefix('"').ok_or_else(usage)?;
    let close = inner.find('"').ok_or_else(usage)?;
    let flags = &inner[close + 1..];
    if !flags.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return Err(usage());
    }
    Ok((line, Some(inner[..close].to_string())))
}

/// `NAME [PATTERN]` for `macro`.
pub fn parse_macro_header(args: &str, location: &SourceLocation) -> Result<(String, String), ParseError> {
    let (name, pattern) = leading_word(args.trim());
    if !is_identifier(name) {
        return Err(ParseError::syntax("expected `macro NAME [PATTERN]`", location.clone()));
    }
    let name = name.to_ascii_lowercase();
    if is_builtin_directive(&name) {
        return Err(ParseError::syntax(format!("`{name}` is a built-in directive"), location.clone()));
    }
    Ok((name, pattern.trim().to_string()))
}

/// `[once] NAME [PATTERN]` for `section`.
pub fn parse_section_header(args: &str, location: &SourceLocation) -> Result<(bool, String, String), ParseError> {
    let (first, rest) = leading_word(args.trim());
    let (is_once, name, pattern) = if first.eq_ignore_ascii_case("once") && !rest.trim().is_empty() {
        let (name, pattern) = leading_word(rest.trim_start());
        (true, name, pattern)
    } else {
        (false, first, rest)
    };
    if !is_identifier(name) {
        return Err(ParseError::syntax("expected `section [once] NAME [PATTERN]`", location.clone()));
    }
    Ok((is_once, name.to_ascii_lowercase(), pattern.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> SourceLocation {
        SourceLocation::new("t.f90", 1)
    }

    #[test]
    fn let_forms() {
        let node = parse_let("x = 1 + 2", &at()).unwrap();
        assert_eq!((node.name.as_str(), node.params, node.expression.as_str()), ("x", None, "1 + 2"));

        let node = parse_let("f(a, b) = a * b", &at()).unwrap();
        assert_eq!(node.params, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(node.expression, "a * b");

        assert!(parse_let("f(a, a) = a", &at()).is_err());
        assert!(parse_let("x == 1", &at()).is_err());
        assert!(parse_let("x =", &at()).is_err());
        assert!(parse_let("1x = 2", &at()).is_err());
    }

    #[test]
    fn condition_strips_then() {
        assert_eq!(parse_condition("if", "(x > 1) then", &at()).unwrap(), "(x > 1)");
        assert_eq!(parse_condition("if", "x THEN", &at()).unwrap(), "x");
        assert_eq!(parse_condition("if", "athen", &at()).unwrap(), "athen");
        assert!(parse_condition("if", "then", &at()).is_err());
        assert!(parse_condition("if", "", &at()).is_err());
    }

    #[test]
    fn do_header_splits_bounds() {
        let h = parse_do("i = 1, max(2, n), 2", &at()).unwrap();
        assert_eq!(h.variable, "i");
        assert_eq!(h.first, "1");
        assert_eq!(h.last, "max(2, n)");
        assert_eq!(h.step.as_deref(), Some("2"));
        assert!(parse_do("i = 1", &at()).is_err());
        assert!(parse_do("i 1, 2", &at()).is_err());
        assert!(parse_do("i = 1, 2, 3, 4", &at()).is_err());
    }

    #[test]
    fn line_forms() {
        assert_eq!(parse_line("line", "100 \"foo.f90\"", &at()).unwrap(), (100, Some("foo.f90".into())));
        assert_eq!(parse_line("12", "\"a.f90\" 1 3", &at()).unwrap(), (12, Some("a.f90".into())));
        assert_eq!(parse_line("line", "7", &at()).unwrap(), (7, None));
        assert!(parse_line("line", "x", &at()).is_err());
        assert!(parse_line("line", "0", &at()).is_err());
        assert!(parse_line("line", "3 foo", &at()).is_err());
    }

    #[test]
    fn section_headers() {
        assert_eq!(
            parse_section_header("once Else", &at()).unwrap(),
            (true, "else".to_string(), String::new())
        );
        assert_eq!(
            parse_section_header("case ^(?P<v>.*)$", &at()).unwrap(),
            (false, "case".to_string(), "^(?P<v>.*)$".to_string())
        );
        assert_eq!(parse_section_header("once", &at()).unwrap(), (false, "once".to_string(), String::new()));
    }

    #[test]
    fn macro_names_cannot_shadow_directives() {
        assert!(parse_macro_header("if", &at()).is_err());
        assert_eq!(parse_macro_header("Swap ^x$", &at()).unwrap(), ("swap".to_string(), "^x$".to_string()));
    }
}
