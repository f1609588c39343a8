use crate::location::SourceLocation;
use crate::parser::error::{ErrorKind, ParseError};

/// First non-blank character of a directive line.
pub const DIRECTIVE_MARKER: char = '#';
/// Trailing character that joins a directive with the following line.
pub const CONTINUATION: char = '&';

/// One logical input line: plain text, or a directive with its
/// continuation lines already joined.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub location: SourceLocation,
    pub kind: LineKind,
    /// Spliced by `use`: the line contributes definitions but no output.
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Plain(String),
    Directive {
        /// Lowercased directive name with compound forms folded
        /// (`end if` is `endif`, `else if` is `elseif`).
        name: String,
        args: String,
        /// Whitespace before the marker.
        indent: String,
    },
}

impl Line {
    pub fn plain(location: SourceLocation, text: impl Into<String>) -> Self {
        Line {
            location,
            kind: LineKind::Plain(text.into()),
            silent: false,
        }
    }

    pub fn is_directive(&self) -> bool {
        matches!(self.kind, LineKind::Directive { .. })
    }

    pub fn directive_name(&self) -> Option<&str> {
        match &self.kind {
            LineKind::Directive { name, .. } => Some(name),
            LineKind::Plain(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(&self.kind, LineKind::Plain(text) if text.trim().is_empty())
    }
}

/// Split a file into logical lines.
pub fn lex(file: &str, source: &str) -> Result<Vec<Line>, ParseError> {
    let physical = physical_lines(source);
    let mut lines = Vec::with_capacity(physical.len());
    let mut index = 0;

    while index < physical.len() {
        let text = physical[index];
        let location = SourceLocation::new(file, index as u32 + 1);
        let trimmed = text.trim_start();

        let Some(body) = trimmed.strip_prefix(DIRECTIVE_MARKER) else {
            lines.push(Line::plain(location, text));
            index += 1;
            continue;
        };

        let indent = text[..text.len() - trimmed.len()].to_string();
        let mut logical = body.trim_end().to_string();
        while logical.ends_with(CONTINUATION) {
            logical.pop();
            logical.push(' ');
            index += 1;
            let Some(next) = physical.get(index) else {
                return Err(ParseError::new(
                    ErrorKind::Lex,
                    "end of file inside directive continuation",
                    location,
                ));
            };
            let next = next.trim();
            let next = next.strip_prefix(CONTINUATION).map_or(next, str::trim_start);
            logical.push_str(next);
        }

        let (name, args) = split_directive(&logical);
        lines.push(Line {
            location,
            kind: LineKind::Directive { name, args, indent },
            silent: false,
        });
        index += 1;
    }

    Ok(lines)
}

/// True for non-empty text whose last line is not terminated.
pub fn missing_final_newline(source: &str) -> bool {
    !source.is_empty() && !source.ends_with('\n')
}

/// Lines split on `\n` only, so a `\r` stays part of the text it ends.
fn physical_lines(source: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = source.split('\n').collect();
    if source.is_empty() || source.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Split directive text (marker removed) into a normalized name and the
/// remaining arguments.
pub fn split_directive(text: &str) -> (String, String) {
    let (word, rest) = leading_word(text.trim());
    let mut name = word.to_ascii_lowercase();
    let mut rest = rest;

    if name == "end" || name == "else" {
        let (second, after) = leading_word(rest.trim_start());
        let second = second.to_ascii_lowercase();
        if !second.is_empty() && (name == "end" || second == "if") {
            name.push_str(&second);
            rest = after;
        }
    }
    if name == "elif" {
        name = "elseif".to_string();
    }

    (name, rest.trim().to_string())
}

/// The leading identifier or digit run of `text`, and what follows it.
pub fn leading_word(text: &str) -> (&str, &str) {
    let end = match text.chars().next() {
        Some(c) if c.is_ascii_digit() => text.find(|c: char| !c.is_ascii_digit()),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        }
        _ => Some(0),
    };
    text.split_at(end.unwrap_or(text.len()))
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(line: &Line) -> (&str, &str) {
        match &line.kind {
            LineKind::Directive { name, args, .. } => (name, args),
            LineKind::Plain(text) => panic!("expected directive, got plain {text:?}"),
        }
    }

    #[test]
    fn plain_lines_are_verbatim() {
        let lines = lex("a.f90", "  x = 1  \r\ny\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, LineKind::Plain("  x = 1  \r".into()));
        assert_eq!(lines[1].location, SourceLocation::new("a.f90", 2));
    }

    #[test]
    fn missing_final_newline_keeps_last_line() {
        assert_eq!(lex("a", "x\ny").unwrap().len(), 2);
        assert!(lex("a", "").unwrap().is_empty());
    }

    #[test]
    fn directive_names_are_normalized() {
        let lines = lex("a", "#End If\n  # else if (x)\n#ELIF y\n#enddo\n#let x = 1\n").unwrap();
        assert_eq!(directive(&lines[0]), ("endif", ""));
        assert_eq!(directive(&lines[1]), ("elseif", "(x)"));
        assert_eq!(directive(&lines[2]), ("elseif", "y"));
        assert_eq!(directive(&lines[3]), ("enddo", ""));
        assert_eq!(directive(&lines[4]), ("let", "x = 1"));
    }

    #[test]
    fn line_directive_name_is_the_number() {
        let lines = lex("a", "# 100 \"foo.f90\"\n").unwrap();
        assert_eq!(directive(&lines[0]), ("100", "\"foo.f90\""));
    }

    #[test]
    fn continuation_joins_and_keeps_first_location() {
        let lines = lex("a", "x\n  #let y = 1 + &\n   & 2 &\n 3\nz\n").unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].location.line, 2);
        let (name, args) = directive(&lines[1]);
        assert_eq!(name, "let");
        assert_eq!(args, "y = 1 +  2  3");
        assert_eq!(lines[2].location.line, 5);
    }

    #[test]
    fn continuation_at_end_of_file_is_a_lex_error() {
        let err = lex("a", "#let x = &\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex);
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn indent_is_recorded() {
        let lines = lex("a", "    #foo bar\n").unwrap();
        match &lines[0].kind {
            LineKind::Directive { indent, .. } => assert_eq!(indent, "    "),
            other => panic!("unexpected {other:?}"),
        }
    }
}
