use regex::Regex;

use crate::location::SourceLocation;
use crate::parser::lexer::Line;

/// A user macro: header patterns with their templates, optional sections,
/// and an optional `finally` template. A macro with sections or a
/// `finally` template is a construct and is closed by `end NAME`.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub patterns: Vec<MacroPattern>,
    pub sections: Vec<MacroSection>,
    pub finally: Option<Vec<Line>>,
    pub location: SourceLocation,
}

impl MacroDef {
    pub fn is_construct(&self) -> bool {
        !self.sections.is_empty() || self.finally.is_some()
    }

    /// Every template: header patterns, section patterns, then `finally`.
    pub fn templates(&self) -> impl Iterator<Item = &[Line]> {
        self.patterns
            .iter()
            .chain(self.sections.iter().flat_map(|section| section.patterns.iter()))
            .map(|pattern| pattern.template.as_slice())
            .chain(self.finally.as_deref())
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MacroSection {
    pub name: String,
    /// A `once` section may appear at most once per invocation.
    pub is_once: bool,
    pub patterns: Vec<MacroPattern>,
    pub location: SourceLocation,
}

/// One alternative of a macro or section: an anchored, case-insensitive
/// pattern and the template lines emitted when it matches.
#[derive(Debug, Clone)]
pub struct MacroPattern {
    pub source: String,
    pub regex: Regex,
    pub template: Vec<Line>,
    pub location: SourceLocation,
}

impl MacroPattern {
    pub fn compile(source: &str) -> Result<Regex, regex::Error> {
        let source = source.trim();
        Regex::new(&format!("(?i)^(?:{source})$"))
    }

    /// Named groups of a whole-text match against trimmed `arguments`.
    /// Groups that did not participate bind to the empty string.
    pub fn captures(&self, arguments: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(arguments.trim())?;
        let bindings = self
            .regex
            .capture_names()
            .flatten()
            .map(|name| {
                let value = captures.name(name).map_or("", |m| m.as_str());
                (name.to_string(), value.to_string())
            })
            .collect();
        Some(bindings)
    }
}
