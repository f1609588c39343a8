use log::{debug, trace};
use tiel::Program;
use tiel::block::{DoNode, IfNode, LetNode, MacroCall, MacroDef, MacroPattern, Node};
use tiel::location::{LocationTracker, SourceLocation};
use tiel::parser::{Line, MacroSignatures, ParseError, resolve};

use crate::environment::Environment;
use crate::error::{DiagnosticError, RuntimeError};
use crate::evaluator::condition;
use crate::macros::{self, MacroTable};
use crate::options::Options;
use crate::output::OutputLine;
use crate::runtime_value::RuntimeValue;
use crate::substitution::substitute;

/// Where `-D` definitions are reported.
const COMMAND_LINE: &str = "<command line>";

/// Runs a resolved node tree and collects the emitted lines.
pub struct Interpreter {
    options: Options,
    env: Environment,
    tracker: LocationTracker,
    macros: MacroTable,
    /// Signatures of macros defined so far, used to resolve templates.
    signatures: MacroSignatures,
    output: Vec<OutputLine>,
    expansion_depth: usize,
    /// Nesting of expansions whose plain lines are discarded.
    silent: usize,
}

impl Interpreter {
    pub fn new(options: Options) -> Self {
        Interpreter {
            options,
            env: Environment::new(),
            tracker: LocationTracker::new(),
            macros: MacroTable::default(),
            signatures: MacroSignatures::default(),
            output: Vec::new(),
            expansion_depth: 0,
            silent: 0,
        }
    }

    /// Bind the configured definitions, then run every node in order.
    pub fn run(mut self, program: &Program) -> Result<Vec<OutputLine>, DiagnosticError> {
        let defines = std::mem::take(&mut self.options.defines);
        for (i, (name, expression)) in defines.iter().enumerate() {
            let location = SourceLocation::new(COMMAND_LINE, i as u32 + 1);
            self.env.set_location(location.clone());
            let value = self.env.evaluate(expression).map_err(|e| e.at(location.clone()))?;
            debug!("define {name} = {value}");
            self.env.define(name, value).map_err(|e| e.at(location))?;
        }

        self.execute_body(&program.nodes, "")?;
        if program.missing_final_newline {
            if let Some(last) = self.output.last_mut() {
                last.newline = false;
            }
        }
        Ok(self.output)
    }

    /// Run a node list. Line overrides set inside it end with it.
    fn execute_body(&mut self, nodes: &[Node], indent: &str) -> Result<(), DiagnosticError> {
        let saved = self.tracker.clone();
        let result = nodes.iter().try_for_each(|node| self.execute_node(node, indent));
        self.tracker = saved;
        result
    }

    /// Map a physical location and make it the current one.
    fn enter(&mut self, location: &SourceLocation) -> SourceLocation {
        let mapped = self.tracker.map(location);
        self.env.set_location(mapped.clone());
        mapped
    }

    fn execute_node(&mut self, node: &Node, indent: &str) -> Result<(), DiagnosticError> {
        match node {
            Node::Plain { text, location } => {
                let location = self.enter(location);
                let text = substitute(text, self.options.inline_style, &mut self.env)
                    .map_err(|e| e.at(location.clone()))?;
                if self.silent > 0 {
                    return Ok(());
                }
                let text = if text.is_empty() { text } else { format!("{indent}{text}") };
                self.output.push(OutputLine {
                    location,
                    text,
                    newline: true,
                });
                Ok(())
            }
            Node::If(node) => self.execute_if(node, indent),
            Node::Do(node) => self.execute_do(node, indent),
            Node::Let(node) => self.execute_let(node),
            Node::Undef { names, location } => {
                let location = self.enter(location);
                self.env.undefine(names).map_err(|e| e.at(location))
            }
            Node::LineMarker { line, file, location } => {
                self.tracker.set_override(location, *line, file.clone());
                Ok(())
            }
            Node::MacroDef(def) => self.define_macro(def),
            Node::Call(call) => self.expand_call(call, indent),
        }
    }

    fn execute_if(&mut self, node: &IfNode, indent: &str) -> Result<(), DiagnosticError> {
        for branch in &node.branches {
            let location = self.enter(&branch.location);
            let taken = self
                .env
                .evaluate(&branch.condition)
                .and_then(|value| condition(&value))
                .map_err(|e| e.at(location))?;
            if taken {
                return self.execute_body(&branch.body, indent);
            }
        }
        match &node.else_body {
            Some(body) => self.execute_body(body, indent),
            None => Ok(()),
        }
    }

    /// Inclusive integer loop. The loop variable and `__INDEX__` live in a
    /// fresh scope per iteration.
    fn execute_do(&mut self, node: &DoNode, indent: &str) -> Result<(), DiagnosticError> {
        let location = self.enter(&node.location);
        let first = self.loop_bound(&node.first).map_err(|e| e.at(location.clone()))?;
        let last = self.loop_bound(&node.last).map_err(|e| e.at(location.clone()))?;
        let step = match &node.step {
            Some(step) => self.loop_bound(step).map_err(|e| e.at(location.clone()))?,
            None => 1,
        };
        if step == 0 {
            return Err(RuntimeError::ZeroStep.at(location));
        }
        trace!("do {} = {first}, {last}, {step} at {location}", node.variable);

        let mut value = first;
        while (step > 0 && value <= last) || (step < 0 && value >= last) {
            self.env
                .push_loop_scope(&node.variable, value)
                .map_err(|e| e.at(location.clone()))?;
            let result = self.execute_body(&node.body, indent);
            self.env.pop_scope();
            result?;
            value = match value.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }

    fn loop_bound(&mut self, text: &str) -> Result<i64, RuntimeError> {
        let value = self.env.evaluate(text)?;
        value.as_integer().ok_or_else(|| RuntimeError::TypeError {
            expected: "an Int loop bound".to_string(),
            got: value.type_name().to_string(),
        })
    }

    fn execute_let(&mut self, node: &LetNode) -> Result<(), DiagnosticError> {
        let location = self.enter(&node.location);
        let result = match &node.params {
            Some(params) => self.env.define_function(&node.name, params.clone(), &node.expression),
            None => self
                .env
                .evaluate(&node.expression)
                .and_then(|value| self.env.define(&node.name, value)),
        };
        result.map_err(|e| e.at(location))
    }

    fn define_macro(&mut self, def: &MacroDef) -> Result<(), DiagnosticError> {
        let location = self.enter(&def.location);
        self.macros.define(def).map_err(|e| e.at(location))?;
        self.signatures.register(def);
        debug!("defined macro `{}` ({} pattern(s))", def.name, def.patterns.len());
        Ok(())
    }

    fn expand_call(&mut self, call: &MacroCall, indent: &str) -> Result<(), DiagnosticError> {
        let location = self.enter(&call.location);
        let def = self
            .macros
            .get(&call.name)
            .ok_or_else(|| RuntimeError::UndefinedMacro(call.name.clone()).at(location.clone()))?;

        let limit = self.options.max_expansion_depth;
        if self.expansion_depth >= limit {
            return Err(RuntimeError::ExpansionDepth(limit).at(location));
        }
        trace!("expanding `{}` at {location}", call.name);

        let silent = usize::from(call.silent);
        self.expansion_depth += 1;
        self.silent += silent;
        let result = self.expand_construct(&def, call, indent, &location);
        self.silent -= silent;
        self.expansion_depth -= 1;
        result
    }

    /// Header template, then the call body, then each section's template
    /// followed by its body, then `finally`. Templates take the
    /// invocation's indentation; bodies keep their own.
    fn expand_construct(
        &mut self,
        def: &MacroDef,
        call: &MacroCall,
        indent: &str,
        location: &SourceLocation,
    ) -> Result<(), DiagnosticError> {
        let template_indent = format!("{indent}{}", call.indent);
        self.expand_patterns(&def.name, &def.patterns, &call.arguments, &template_indent, location)?;
        if !def.is_construct() {
            return Ok(());
        }

        self.execute_body(&call.body, indent)?;

        let sections = macros::pair_sections(def, call).map_err(|(i, error)| {
            let at = call.sections.get(i).map_or(&call.location, |s| &s.location);
            error.at(self.tracker.map(at))
        })?;
        for (declared, section) in sections.into_iter().zip(&call.sections) {
            let location = self.enter(&section.location);
            let name = format!("{} {}", def.name, section.name);
            self.expand_patterns(&name, &declared.patterns, &section.arguments, &template_indent, &location)?;
            self.execute_body(&section.body, indent)?;
        }

        if let Some(finally) = &def.finally {
            self.expand_template(finally, Vec::new(), &template_indent, location)?;
        }
        Ok(())
    }

    fn expand_patterns(
        &mut self,
        name: &str,
        patterns: &[MacroPattern],
        arguments: &str,
        indent: &str,
        location: &SourceLocation,
    ) -> Result<(), DiagnosticError> {
        let (pattern, bindings) = macros::match_pattern(patterns, arguments).ok_or_else(|| {
            RuntimeError::NoMatchingPattern {
                name: name.to_string(),
                arguments: arguments.trim().to_string(),
            }
            .at(location.clone())
        })?;
        trace!("`{name}` matched /{}/", pattern.source);
        self.expand_template(&pattern.template, bindings, indent, location)
    }

    /// Resolve template lines against the macros known now and run them in
    /// a scope holding the pattern's captures.
    fn expand_template(
        &mut self,
        template: &[Line],
        bindings: Vec<(String, String)>,
        indent: &str,
        location: &SourceLocation,
    ) -> Result<(), DiagnosticError> {
        let nodes = resolve(template.to_vec(), &mut self.signatures).map_err(structure_error)?;

        self.env.push_scope();
        let result = bindings
            .into_iter()
            .try_for_each(|(name, value)| self.env.bind_local(&name, RuntimeValue::String(value)))
            .map_err(|e| e.at(location.clone()))
            .and_then(|()| self.execute_body(&nodes, indent));
        self.env.pop_scope();
        result
    }
}

fn structure_error(error: ParseError) -> DiagnosticError {
    let location = error.location.clone();
    RuntimeError::Structure(error).at(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiel::parser::Parser;

    fn run(source: &str) -> Result<Vec<String>, DiagnosticError> {
        let program = Parser::new(Vec::new()).parse_source("t.f90", source).unwrap();
        let lines = Interpreter::new(Options::default()).run(&program)?;
        Ok(lines.into_iter().map(|l| l.text).collect())
    }

    #[test]
    fn plain_lines_pass_through() {
        assert_eq!(run("a\n\nb\n").unwrap(), ["a", "", "b"]);
    }

    #[test]
    fn if_takes_the_first_true_branch() {
        let src = "#let x = 2\n#if x == 1\none\n#elif x == 2\ntwo\n#elif x > 0\nthree\n#else\nother\n#endif\n";
        assert_eq!(run(src).unwrap(), ["two"]);
    }

    #[test]
    fn do_loop_is_inclusive_and_scoped() {
        let src = "#do i = 1, 5, 2\nv`i`\n#enddo\n#if defined('i')\nleak\n#endif\n";
        assert_eq!(run(src).unwrap(), ["v1", "v3", "v5"]);
        assert!(run("#do i = 3, 1\nx\n#enddo\n").unwrap().is_empty());
    }

    #[test]
    fn zero_step_is_an_error() {
        let err = run("#do i = 1, 3, 0\nx\n#enddo\n").unwrap_err();
        assert!(matches!(err.error, RuntimeError::ZeroStep));
        assert_eq!(err.location, SourceLocation::new("t.f90", 1));
    }

    #[test]
    fn functions_and_undef() {
        let src = "#let sq(n) = n * n\n`sq(4)`\n#undef sq\n`sq(2)`\n";
        let err = run(src).unwrap_err();
        assert!(matches!(err.error, RuntimeError::UndefinedFunction(_)));
        assert_eq!(err.location.line, 4);
    }

    #[test]
    fn macro_expansion_is_indented() {
        let src = "#macro twice (?P<x>\\w+)\n`x` = `x` * 2\n#endmacro\n  #twice a\n";
        assert_eq!(run(src).unwrap(), ["  a = a * 2"]);
    }

    #[test]
    fn runaway_expansion_is_bounded() {
        let src = "#macro loop\n#loop\n#endmacro\n#loop\n";
        let err = run(src).unwrap_err();
        assert!(matches!(err.error, RuntimeError::ExpansionDepth(64)));
    }

    #[test]
    fn defines_are_bound_before_the_first_line() {
        let program = Parser::new(Vec::new()).parse_source("t.f90", "`N + 1` `DEBUG`\n").unwrap();
        let mut options = Options::default();
        options.define("N=41");
        options.define("DEBUG");
        let lines = Interpreter::new(options).run(&program).unwrap();
        assert_eq!(lines[0].text, "42 true");
    }
}
