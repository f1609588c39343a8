use std::collections::HashMap;

use log::trace;

use crate::block::{
    Branch, CallSection, DoNode, IfNode, MacroCall, MacroDef, MacroPattern, MacroSection, Node,
};
use crate::location::SourceLocation;
use crate::parser::directive::{self, is_builtin_directive};
use crate::parser::error::{ErrorKind, ParseError};
use crate::parser::lexer::{Line, LineKind};

// ---------------------------------------------------------------------------
// Macro signatures
// ---------------------------------------------------------------------------

/// What the structure pass needs to know about a macro to recognise its
/// invocations: whether it takes a body, and the names of its sections.
#[derive(Debug, Clone, Default)]
pub struct MacroSignatures {
    entries: HashMap<String, Signature>,
}

#[derive(Debug, Clone)]
struct Signature {
    is_construct: bool,
    sections: Vec<String>,
}

impl MacroSignatures {
    /// Record `def`, and every macro its templates define when expanded,
    /// so invocations of those can be recognised before they run.
    pub fn register(&mut self, def: &MacroDef) {
        self.entries.insert(
            def.name.clone(),
            Signature {
                is_construct: def.is_construct(),
                sections: def.section_names(),
            },
        );
        for template in def.templates() {
            self.register_nested(template);
        }
    }

    fn register_nested(&mut self, template: &[Line]) {
        let mut depth = 0usize;
        let mut start = 0;
        for (i, line) in template.iter().enumerate() {
            match line.directive_name() {
                Some("macro") => {
                    if depth == 0 {
                        start = i;
                    }
                    depth += 1;
                }
                Some("endmacro") if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        // A malformed definition is reported when the template runs.
                        let _ = resolve(template[start..=i].to_vec(), self);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Match every block directive with its terminator and build the node tree.
pub fn resolve(lines: Vec<Line>, signatures: &mut MacroSignatures) -> Result<Vec<Node>, ParseError> {
    let mut state = ResolveState {
        signatures,
        stack: Vec::new(),
        root: Vec::new(),
    };
    for line in lines {
        state.feed(line)?;
    }
    state.finish()
}

// ---------------------------------------------------------------------------
// Resolve state
// ---------------------------------------------------------------------------

struct ResolveState<'a> {
    signatures: &'a mut MacroSignatures,
    /// Open blocks. Innermost last.
    stack: Vec<Frame>,
    root: Vec<Node>,
}

struct Frame {
    location: SourceLocation,
    /// Nodes of the part currently being filled.
    body: Vec<Node>,
    kind: FrameKind,
}

enum FrameKind {
    If {
        branches: Vec<Branch>,
        condition: String,
        branch_location: SourceLocation,
        in_else: bool,
    },
    Do(directive::DoHeader),
    Call {
        call: MacroCall,
        section_names: Vec<String>,
        /// Header of the section being filled, if any.
        open_section: Option<(String, String, SourceLocation)>,
    },
    Macro(MacroBuilder),
}

impl FrameKind {
    fn opener(&self) -> String {
        match self {
            FrameKind::If { .. } => "if".to_string(),
            FrameKind::Do(_) => "do".to_string(),
            FrameKind::Call { call, .. } => call.name.clone(),
            FrameKind::Macro(_) => "macro".to_string(),
        }
    }
}

impl ResolveState<'_> {
    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.body.push(node),
            None => self.root.push(node),
        }
    }

    fn feed(&mut self, line: Line) -> Result<(), ParseError> {
        if matches!(self.stack.last(), Some(Frame { kind: FrameKind::Macro(_), .. })) {
            return self.feed_macro(line);
        }
        match line.kind {
            LineKind::Plain(text) => {
                self.push_node(Node::Plain {
                    text,
                    location: line.location,
                });
                Ok(())
            }
            LineKind::Directive { name, args, indent } => {
                self.directive(&name, &args, indent, line.location, line.silent)
            }
        }
    }

    fn directive(
        &mut self,
        name: &str,
        args: &str,
        indent: String,
        location: SourceLocation,
        silent: bool,
    ) -> Result<(), ParseError> {
        match name {
            "" => Err(ParseError::syntax("empty directive", location)),
            "let" => {
                let node = directive::parse_let(args, &location)?;
                self.push_node(Node::Let(node));
                Ok(())
            }
            "undef" | "del" => {
                let names = directive::parse_names(args, &location)?;
                self.push_node(Node::Undef { names, location });
                Ok(())
            }
            "if" => {
                let condition = directive::parse_condition("if", args, &location)?;
                self.stack.push(Frame {
                    location: location.clone(),
                    body: Vec::new(),
                    kind: FrameKind::If {
                        branches: Vec::new(),
                        condition,
                        branch_location: location,
                        in_else: false,
                    },
                });
                Ok(())
            }
            "elseif" => self.else_if(args, location),
            "else" => self.else_branch(args, location),
            "endif" => self.close("endif", args, location),
            "do" => {
                let header = directive::parse_do(args, &location)?;
                self.stack.push(Frame {
                    location,
                    body: Vec::new(),
                    kind: FrameKind::Do(header),
                });
                Ok(())
            }
            "enddo" => self.close("enddo", args, location),
            "line" => self.line_marker(name, args, location),
            _ if name.chars().all(|c| c.is_ascii_digit()) => self.line_marker(name, args, location),
            "macro" => {
                let (macro_name, pattern) = directive::parse_macro_header(args, &location)?;
                let builder = MacroBuilder::new(macro_name, pattern, location.clone());
                self.stack.push(Frame {
                    location,
                    body: Vec::new(),
                    kind: FrameKind::Macro(builder),
                });
                Ok(())
            }
            "pattern" | "section" | "finally" | "endmacro" => Err(ParseError::syntax(
                format!("misplaced `{name}` directive outside a macro definition"),
                location,
            )),
            "include" | "use" | "import" => Err(ParseError::syntax(
                format!("`{name}` is only allowed in source files"),
                location,
            )),
            _ => self.user_directive(name, args, indent, location, silent),
        }
    }

    fn line_marker(&mut self, name: &str, args: &str, location: SourceLocation) -> Result<(), ParseError> {
        let (line, file) = directive::parse_line(name, args, &location)?;
        self.push_node(Node::LineMarker { line, file, location });
        Ok(())
    }

    fn else_if(&mut self, args: &str, location: SourceLocation) -> Result<(), ParseError> {
        let condition_text = directive::parse_condition("else if", args, &location)?;
        let Some(frame) = self.stack.last_mut() else {
            return Err(ParseError::structure("`else if` without a matching `if`", location));
        };
        let frame_location = frame.location.clone();
        let opener = frame.kind.opener();
        let FrameKind::If { branches, condition, branch_location, in_else } = &mut frame.kind else {
            return Err(ParseError::structure(format!("`else if` inside `{opener}`"), location)
                .with_related(frame_location, format!("`{opener}` opened here")));
        };
        if *in_else {
            return Err(ParseError::structure("`else if` after `else`", location)
                .with_related(frame_location, "`if` opened here"));
        }
        branches.push(Branch {
            condition: std::mem::replace(condition, condition_text),
            body: std::mem::take(&mut frame.body),
            location: std::mem::replace(branch_location, location),
        });
        Ok(())
    }

    fn else_branch(&mut self, args: &str, location: SourceLocation) -> Result<(), ParseError> {
        if !args.is_empty() {
            return Err(ParseError::syntax("`else` takes no arguments", location));
        }
        let Some(frame) = self.stack.last_mut() else {
            return Err(ParseError::structure("`else` without a matching `if`", location));
        };
        let frame_location = frame.location.clone();
        let opener = frame.kind.opener();
        let FrameKind::If { branches, condition, branch_location, in_else } = &mut frame.kind else {
            return Err(ParseError::structure(format!("`else` inside `{opener}`"), location)
                .with_related(frame_location, format!("`{opener}` opened here")));
        };
        if *in_else {
            return Err(ParseError::structure("duplicate `else`", location)
                .with_related(frame_location, "`if` opened here"));
        }
        branches.push(Branch {
            condition: std::mem::take(condition),
            body: std::mem::take(&mut frame.body),
            location: branch_location.clone(),
        });
        *in_else = true;
        Ok(())
    }

    /// Close the innermost block with `terminator` (`endif`, `enddo`, or
    /// `end` followed by a macro name).
    fn close(&mut self, terminator: &str, args: &str, location: SourceLocation) -> Result<(), ParseError> {
        let expected = terminator.strip_prefix("end").unwrap_or(terminator);
        let Some(frame) = self.stack.pop() else {
            return Err(ParseError::structure(
                format!("`end {expected}` without a matching `{expected}`"),
                location,
            ));
        };
        let opener = frame.kind.opener();
        if opener != expected {
            let err = ParseError::structure(
                format!("`end {expected}` does not close the open `{opener}`"),
                location,
            )
            .with_related(frame.location.clone(), format!("`{opener}` opened here"));
            return Err(err);
        }
        if !args.is_empty() {
            return Err(ParseError::syntax(format!("`end {expected}` takes no arguments"), location));
        }

        let Frame { location: opened_at, body, kind } = frame;
        let node = match kind {
            FrameKind::If { mut branches, condition, branch_location, in_else } => {
                let else_body = if in_else {
                    Some(body)
                } else {
                    branches.push(Branch {
                        condition,
                        body,
                        location: branch_location,
                    });
                    None
                };
                Node::If(IfNode {
                    branches,
                    else_body,
                    location: opened_at,
                })
            }
            FrameKind::Do(header) => Node::Do(DoNode {
                variable: header.variable,
                first: header.first,
                last: header.last,
                step: header.step,
                body,
                location: opened_at,
            }),
            FrameKind::Call { mut call, open_section, .. } => {
                match open_section {
                    Some((name, arguments, location)) => call.sections.push(CallSection {
                        name,
                        arguments,
                        body,
                        location,
                    }),
                    None => call.body = body,
                }
                Node::Call(call)
            }
            // Macro frames are closed by `feed_macro`.
            FrameKind::Macro(_) => {
                return Err(ParseError::structure("unexpected block terminator", location));
            }
        };
        self.push_node(node);
        Ok(())
    }

    /// A directive that is not built in: a macro invocation, a section or
    /// terminator of the enclosing construct call, or an error.
    fn user_directive(
        &mut self,
        name: &str,
        args: &str,
        indent: String,
        location: SourceLocation,
        silent: bool,
    ) -> Result<(), ParseError> {
        if let Some(Frame { kind: FrameKind::Call { call, section_names, .. }, .. }) = self.stack.last() {
            if name.strip_prefix("end") == Some(call.name.as_str()) {
                return self.close(name, args, location);
            }
            if section_names.iter().any(|s| s == name) {
                return self.open_call_section(name, args, location);
            }
        }

        if let Some(signature) = self.signatures.entries.get(name) {
            trace!("invocation of `{name}` at {location}");
            let call = MacroCall {
                name: name.to_string(),
                arguments: args.to_string(),
                indent,
                body: Vec::new(),
                sections: Vec::new(),
                location: location.clone(),
                silent,
            };
            if signature.is_construct {
                let section_names = signature.sections.clone();
                self.stack.push(Frame {
                    location,
                    body: Vec::new(),
                    kind: FrameKind::Call {
                        call,
                        section_names,
                        open_section: None,
                    },
                });
            } else {
                self.push_node(Node::Call(call));
            }
            return Ok(());
        }

        if let Some(target) = name.strip_prefix("end").filter(|t| self.signatures.contains(t)) {
            let mut err = ParseError::structure(format!("`end {target}` without a matching `{target}`"), location);
            if let Some(frame) = self.stack.last() {
                let opener = frame.kind.opener();
                err = err.with_related(frame.location.clone(), format!("`{opener}` opened here"));
            }
            return Err(err);
        }

        let in_section_of = self.signatures.entries.iter().find(|(_, s)| s.sections.iter().any(|n| n == name));
        if let Some((owner, _)) = in_section_of {
            return Err(ParseError::syntax(
                format!("misplaced `{name}` directive outside a `{owner}` invocation"),
                location,
            ));
        }

        Err(ParseError::syntax(format!("unknown directive `{name}`"), location))
    }

    fn open_call_section(&mut self, name: &str, args: &str, location: SourceLocation) -> Result<(), ParseError> {
        let Some(frame) = self.stack.last_mut() else {
            return Err(ParseError::structure(format!("misplaced `{name}`"), location));
        };
        let FrameKind::Call { call, open_section, .. } = &mut frame.kind else {
            return Err(ParseError::structure(format!("misplaced `{name}`"), location));
        };
        let body = std::mem::take(&mut frame.body);
        match open_section.take() {
            Some((section, arguments, opened_at)) => call.sections.push(CallSection {
                name: section,
                arguments,
                body,
                location: opened_at,
            }),
            None => call.body = body,
        }
        *open_section = Some((name.to_string(), args.to_string(), location));
        Ok(())
    }

    /// Route a line into the innermost macro definition.
    fn feed_macro(&mut self, line: Line) -> Result<(), ParseError> {
        let name = line.directive_name().map(str::to_string);
        let Some(Frame { kind: FrameKind::Macro(builder), .. }) = self.stack.last_mut() else {
            return Ok(());
        };

        if builder.depth > 0 {
            match name.as_deref() {
                Some("macro") => builder.depth += 1,
                Some("endmacro") => builder.depth -= 1,
                _ => {}
            }
            builder.push_line(line);
            return Ok(());
        }

        let args = match &line.kind {
            LineKind::Directive { args, .. } => args.as_str(),
            LineKind::Plain(_) => "",
        };
        match name.as_deref() {
            Some("macro") => {
                builder.depth += 1;
                builder.push_line(line);
                Ok(())
            }
            Some("pattern") => builder.start_pattern(args, &line.location),
            Some("section") => builder.start_section(args, &line.location),
            Some("finally") => builder.start_finally(args, &line.location),
            Some("endmacro") => {
                if !args.is_empty() {
                    return Err(ParseError::syntax("`end macro` takes no arguments", line.location));
                }
                let Some(Frame { kind: FrameKind::Macro(builder), .. }) = self.stack.pop() else {
                    return Ok(());
                };
                let def = builder.finish()?;
                self.signatures.register(&def);
                self.push_node(Node::MacroDef(def));
                Ok(())
            }
            _ => {
                builder.push_line(line);
                Ok(())
            }
        }
    }

    fn finish(mut self) -> Result<Vec<Node>, ParseError> {
        if let Some(frame) = self.stack.pop() {
            let opener = frame.kind.opener();
            let terminator = match &frame.kind {
                FrameKind::Macro(_) => "end macro".to_string(),
                _ => format!("end {opener}"),
            };
            return Err(ParseError::new(
                ErrorKind::UnterminatedBlock,
                format!("`{opener}` is never closed, expected `{terminator}`"),
                frame.location,
            ));
        }
        Ok(self.root)
    }
}

// ---------------------------------------------------------------------------
// Macro definitions
// ---------------------------------------------------------------------------

struct PendingPattern {
    source: String,
    template: Vec<Line>,
    location: SourceLocation,
}

struct PendingSection {
    name: String,
    is_once: bool,
    patterns: Vec<PendingPattern>,
    location: SourceLocation,
}

/// Collects the lines of a `macro` ... `end macro` block.
struct MacroBuilder {
    name: String,
    location: SourceLocation,
    /// Nesting of macro definitions inside this one's templates.
    depth: usize,
    patterns: Vec<PendingPattern>,
    sections: Vec<PendingSection>,
    finally: Option<Vec<Line>>,
}

impl MacroBuilder {
    fn new(name: String, pattern: String, location: SourceLocation) -> Self {
        MacroBuilder {
            name,
            patterns: vec![PendingPattern {
                source: pattern,
                template: Vec::new(),
                location: location.clone(),
            }],
            location,
            depth: 0,
            sections: Vec::new(),
            finally: None,
        }
    }

    fn push_line(&mut self, line: Line) {
        if let Some(finally) = &mut self.finally {
            finally.push(line);
            return;
        }
        let patterns = match self.sections.last_mut() {
            Some(section) => &mut section.patterns,
            None => &mut self.patterns,
        };
        if let Some(pattern) = patterns.last_mut() {
            pattern.template.push(line);
        }
    }

    fn start_pattern(&mut self, args: &str, location: &SourceLocation) -> Result<(), ParseError> {
        if self.finally.is_some() {
            return Err(ParseError::syntax("`pattern` after `finally`", location.clone()));
        }
        let pattern = PendingPattern {
            source: args.trim().to_string(),
            template: Vec::new(),
            location: location.clone(),
        };
        match self.sections.last_mut() {
            Some(section) => section.patterns.push(pattern),
            None => self.patterns.push(pattern),
        }
        Ok(())
    }

    fn start_section(&mut self, args: &str, location: &SourceLocation) -> Result<(), ParseError> {
        if self.finally.is_some() {
            return Err(ParseError::syntax("`section` after `finally`", location.clone()));
        }
        let (is_once, name, pattern) = directive::parse_section_header(args, location)?;
        if name == self.name {
            return Err(ParseError::syntax(
                format!("section `{name}` has the same name as its macro"),
                location.clone(),
            ));
        }
        if let Some(previous) = self.sections.iter().find(|s| s.name == name) {
            return Err(ParseError::syntax(format!("duplicate section `{name}`"), location.clone())
                .with_related(previous.location.clone(), "first defined here"));
        }
        if is_builtin_directive(&name) || name == format!("end{}", self.name) {
            return Err(ParseError::syntax(format!("`{name}` cannot name a section"), location.clone()));
        }
        self.sections.push(PendingSection {
            name,
            is_once,
            patterns: vec![PendingPattern {
                source: pattern,
                template: Vec::new(),
                location: location.clone(),
            }],
            location: location.clone(),
        });
        Ok(())
    }

    fn start_finally(&mut self, args: &str, location: &SourceLocation) -> Result<(), ParseError> {
        if !args.is_empty() {
            return Err(ParseError::syntax("`finally` takes no arguments", location.clone()));
        }
        if self.finally.is_some() {
            return Err(ParseError::syntax("duplicate `finally`", location.clone()));
        }
        self.finally = Some(Vec::new());
        Ok(())
    }

    fn finish(self) -> Result<MacroDef, ParseError> {
        let patterns = compile_patterns(self.patterns)?;
        let sections = self
            .sections
            .into_iter()
            .map(|section| {
                Ok(MacroSection {
                    name: section.name,
                    is_once: section.is_once,
                    patterns: compile_patterns(section.patterns)?,
                    location: section.location,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(MacroDef {
            name: self.name,
            patterns,
            sections,
            finally: self.finally,
            location: self.location,
        })
    }
}

/// Compile pending patterns. The implicit first alternative of a header
/// without a pattern is dropped when it has no template and later
/// alternatives exist.
fn compile_patterns(pending: Vec<PendingPattern>) -> Result<Vec<MacroPattern>, ParseError> {
    let has_explicit = pending.len() > 1;
    pending
        .into_iter()
        .enumerate()
        .filter(|(i, p)| !(*i == 0 && has_explicit && p.source.is_empty() && p.template.iter().all(Line::is_blank)))
        .map(|(_, p)| {
            let regex = MacroPattern::compile(&p.source).map_err(|e| {
                ParseError::syntax(format!("invalid macro pattern `{}`", p.source), p.location.clone())
                    .with_note(e.to_string())
            })?;
            Ok(MacroPattern {
                source: p.source,
                regex,
                template: p.template,
                location: p.location,
            })
        })
        .collect()
}
