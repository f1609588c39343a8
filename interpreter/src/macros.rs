use std::collections::HashMap;
use std::rc::Rc;

use tiel::block::{MacroCall, MacroDef, MacroPattern, MacroSection};

use crate::error::RuntimeError;

/// Macros defined so far in a run, keyed by lowercase name.
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, Rc<MacroDef>>,
}

impl MacroTable {
    pub fn define(&mut self, def: &MacroDef) -> Result<(), RuntimeError> {
        if self.macros.contains_key(&def.name) {
            return Err(RuntimeError::MacroRedefined(def.name.clone()));
        }
        self.macros.insert(def.name.clone(), Rc::new(def.clone()));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Rc<MacroDef>> {
        self.macros.get(name).cloned()
    }
}

/// The first pattern, in declaration order, matching the whole argument
/// text, with its named captures.
pub fn match_pattern<'a>(
    patterns: &'a [MacroPattern],
    arguments: &str,
) -> Option<(&'a MacroPattern, Vec<(String, String)>)> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(arguments).map(|bindings| (pattern, bindings)))
}

/// Pair each section of a construct invocation with its declaration.
///
/// Sections must follow declaration order; a section may repeat unless it
/// is `once`. Returns the index into `call.sections` of the first section
/// that breaks the order.
pub fn pair_sections<'a>(def: &'a MacroDef, call: &MacroCall) -> Result<Vec<&'a MacroSection>, (usize, RuntimeError)> {
    let mut declared = def.sections.iter().peekable();
    let mut paired = Vec::with_capacity(call.sections.len());

    for (i, section) in call.sections.iter().enumerate() {
        while declared.next_if(|d| d.name != section.name).is_some() {}
        let Some(found) = declared.peek().copied() else {
            return Err((
                i,
                RuntimeError::UnexpectedSection {
                    name: def.name.clone(),
                    section: section.name.clone(),
                },
            ));
        };
        if found.is_once {
            declared.next();
        }
        paired.push(found);
    }

    Ok(paired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiel::block::CallSection;
    use tiel::location::SourceLocation;

    fn pattern(source: &str) -> MacroPattern {
        MacroPattern {
            source: source.to_string(),
            regex: MacroPattern::compile(source).unwrap(),
            template: Vec::new(),
            location: SourceLocation::new("m", 1),
        }
    }

    fn section(name: &str, is_once: bool) -> MacroSection {
        MacroSection {
            name: name.to_string(),
            is_once,
            patterns: vec![pattern("")],
            location: SourceLocation::new("m", 2),
        }
    }

    fn construct() -> MacroDef {
        MacroDef {
            name: "select".to_string(),
            patterns: vec![pattern("")],
            sections: vec![section("case", false), section("default", true)],
            finally: None,
            location: SourceLocation::new("m", 1),
        }
    }

    fn call(sections: &[&str]) -> MacroCall {
        MacroCall {
            name: "select".to_string(),
            arguments: String::new(),
            indent: String::new(),
            body: Vec::new(),
            sections: sections
                .iter()
                .map(|name| CallSection {
                    name: name.to_string(),
                    arguments: String::new(),
                    body: Vec::new(),
                    location: SourceLocation::new("f", 1),
                })
                .collect(),
            location: SourceLocation::new("f", 1),
            silent: false,
        }
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut table = MacroTable::default();
        table.define(&construct()).unwrap();
        assert!(matches!(table.define(&construct()), Err(RuntimeError::MacroRedefined(_))));
        assert!(table.get("select").is_some());
    }

    #[test]
    fn first_matching_pattern_wins() {
        let patterns = vec![pattern(r"(?P<a>\d+)"), pattern(r"(?P<b>\w+)")];
        let (found, bindings) = match_pattern(&patterns, " 42 ").unwrap();
        assert_eq!(found.source, r"(?P<a>\d+)");
        assert_eq!(bindings, vec![("a".to_string(), "42".to_string())]);
        assert!(match_pattern(&patterns, "a b").is_none());
    }

    #[test]
    fn sections_follow_declaration_order() {
        let def = construct();
        let paired = pair_sections(&def, &call(&["case", "case", "default"])).unwrap();
        let names: Vec<_> = paired.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["case", "case", "default"]);
        assert!(pair_sections(&def, &call(&[])).unwrap().is_empty());
    }

    #[test]
    fn out_of_order_or_repeated_once_sections_fail() {
        let def = construct();
        let (index, err) = pair_sections(&def, &call(&["default", "case"])).unwrap_err();
        assert_eq!(index, 1);
        assert!(matches!(err, RuntimeError::UnexpectedSection { section, .. } if section == "case"));

        let (index, _) = pair_sections(&def, &call(&["default", "default"])).unwrap_err();
        assert_eq!(index, 1);
    }
}
