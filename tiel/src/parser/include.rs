use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::location::SourceLocation;
use crate::parser::error::{ErrorKind, ParseError};
use crate::parser::lexer::{self, Line, LineKind};
use crate::source::SourceMap;

/// A file currently being spliced.
#[derive(Debug, Clone)]
struct IncludeFrame {
    path: PathBuf,
    display: String,
}

/// How an included file's lines are spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IncludeMode {
    /// Every line.
    Include,
    /// Directive lines only, and only the first time the file is reached.
    Use,
}

/// Lexes files and splices `include`/`use` directives in place, guarding
/// against inclusion cycles.
pub struct IncludeResolver {
    search_paths: Vec<PathBuf>,
    stack: Vec<IncludeFrame>,
    used: HashSet<PathBuf>,
    sources: SourceMap,
    root_missing_final_newline: bool,
}

impl IncludeResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        IncludeResolver {
            search_paths,
            stack: Vec::new(),
            used: HashSet::new(),
            sources: SourceMap::new(),
            root_missing_final_newline: false,
        }
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn into_sources(self) -> SourceMap {
        self.sources
    }

    /// Whether the last root source loaded ends without a line terminator.
    pub fn root_missing_final_newline(&self) -> bool {
        self.root_missing_final_newline
    }

    /// Read, lex and splice a root file.
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<Line>, ParseError> {
        let display = path.display().to_string();
        let source = fs::read_to_string(path).map_err(|e| {
            ParseError::new(
                ErrorKind::Io,
                format!("cannot read `{display}`: {e}"),
                SourceLocation::new(display.clone(), 1),
            )
        })?;
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.root_missing_final_newline = lexer::missing_final_newline(&source);
        self.splice(display, canonical, &source, false)
    }

    /// Lex and splice an in-memory root source. Relative includes resolve
    /// against the directory part of `name`.
    pub fn load_source(&mut self, name: &str, source: &str) -> Result<Vec<Line>, ParseError> {
        self.root_missing_final_newline = lexer::missing_final_newline(source);
        self.splice(name.to_string(), PathBuf::from(name), source, false)
    }

    fn splice(
        &mut self,
        display: String,
        path: PathBuf,
        source: &str,
        directives_only: bool,
    ) -> Result<Vec<Line>, ParseError> {
        debug!("splicing {display}");
        self.sources.add(display.clone(), source);
        self.stack.push(IncludeFrame { path, display: display.clone() });
        let result = self.splice_lines(&display, source, directives_only);
        self.stack.pop();
        result
    }

    fn splice_lines(
        &mut self,
        display: &str,
        source: &str,
        directives_only: bool,
    ) -> Result<Vec<Line>, ParseError> {
        let lines = lexer::lex(display, source)?;
        let mut out = Vec::with_capacity(lines.len());
        // Template lines of macro definitions survive `use` filtering.
        let mut macro_depth = 0usize;
        for mut line in lines {
            match line.directive_name() {
                Some("macro") => macro_depth += 1,
                Some("endmacro") => macro_depth = macro_depth.saturating_sub(1),
                _ => {}
            }
            if let Some((mode, target)) = include_request(&line)? {
                let nested_only = directives_only || mode == IncludeMode::Use;
                out.extend(self.include(&line.location, &target, mode, nested_only)?);
            } else if !directives_only || line.is_directive() || macro_depth > 0 {
                line.silent = directives_only && macro_depth == 0;
                out.push(line);
            }
        }
        Ok(out)
    }

    fn include(
        &mut self,
        at: &SourceLocation,
        target: &str,
        mode: IncludeMode,
        directives_only: bool,
    ) -> Result<Vec<Line>, ParseError> {
        let found = self.find(target).ok_or_else(|| {
            ParseError::new(ErrorKind::Io, format!("cannot find included file `{target}`"), at.clone())
        })?;
        let canonical = fs::canonicalize(&found).unwrap_or_else(|_| found.clone());

        if let Some(start) = self.stack.iter().position(|frame| frame.path == canonical) {
            let mut chain: Vec<&str> = self.stack[start..].iter().map(|f| f.display.as_str()).collect();
            chain.push(target);
            return Err(ParseError::new(
                ErrorKind::CyclicInclude,
                format!("`{target}` includes itself"),
                at.clone(),
            )
            .with_note(format!("include chain: {}", chain.join(" -> "))));
        }

        if mode == IncludeMode::Use && !self.used.insert(canonical.clone()) {
            trace!("`{target}` already used, skipping");
            return Ok(Vec::new());
        }

        let source = fs::read_to_string(&found).map_err(|e| {
            ParseError::new(ErrorKind::Io, format!("cannot read `{}`: {e}", found.display()), at.clone())
        })?;
        self.splice(found.display().to_string(), canonical, &source, directives_only)
    }

    /// The literal path, then the including file's directory, then each
    /// search path.
    fn find(&self, target: &str) -> Option<PathBuf> {
        let literal = PathBuf::from(target);
        if literal.is_file() {
            return Some(literal);
        }
        if literal.is_absolute() {
            return None;
        }
        let current_dir = self
            .stack
            .last()
            .and_then(|frame| Path::new(&frame.display).parent().map(Path::to_path_buf));
        current_dir
            .into_iter()
            .chain(self.search_paths.iter().cloned())
            .map(|dir| dir.join(target))
            .find(|candidate| candidate.is_file())
    }
}

/// Recognise `include`, `use` and `import` lines and extract their path.
fn include_request(line: &Line) -> Result<Option<(IncludeMode, String)>, ParseError> {
    let LineKind::Directive { name, args, .. } = &line.kind else {
        return Ok(None);
    };
    let mode = match name.as_str() {
        "include" => IncludeMode::Include,
        "use" | "import" => IncludeMode::Use,
        _ => return Ok(None),
    };
    let path = unquote_path(args).ok_or_else(|| {
        ParseError::syntax(
            format!("`{name}` expects a quoted path, found `{args}`"),
            line.location.clone(),
        )
    })?;
    Ok(Some((mode, path)))
}

fn unquote_path(args: &str) -> Option<String> {
    let args = args.trim();
    let close = match args.chars().next()? {
        '"' => '"',
        '\'' => '\'',
        '<' => '>',
        _ => return None,
    };
    let inner = args.get(1..)?.strip_suffix(close)?;
    (!inner.is_empty() && !inner.contains(close)).then(|| inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_accepts_three_forms() {
        assert_eq!(unquote_path("\"a.inc\"").as_deref(), Some("a.inc"));
        assert_eq!(unquote_path("'a.inc'").as_deref(), Some("a.inc"));
        assert_eq!(unquote_path("<dir/a.inc>").as_deref(), Some("dir/a.inc"));
        assert_eq!(unquote_path("a.inc"), None);
        assert_eq!(unquote_path("\"a.inc"), None);
        assert_eq!(unquote_path("\"\""), None);
    }

    #[test]
    fn missing_include_is_an_io_error() {
        let mut resolver = IncludeResolver::new(Vec::new());
        let err = resolver
            .load_source("main.f90", "x\n#include \"does/not/exist.inc\"\n")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.location, SourceLocation::new("main.f90", 2));
    }

    #[test]
    fn unquoted_include_is_a_syntax_error() {
        let mut resolver = IncludeResolver::new(Vec::new());
        let err = resolver.load_source("main.f90", "#include foo.inc\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn use_keeps_directives_and_macro_templates_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.f90"), "code\n#macro m\nbody\n#end macro\n#let x = 1\n").unwrap();
        let main = dir.path().join("main.f90");
        fs::write(&main, "#use \"lib.f90\"\n#use \"lib.f90\"\nend\n").unwrap();

        let mut resolver = IncludeResolver::new(Vec::new());
        let lines = resolver.load_file(&main).unwrap();
        let kinds: Vec<_> = lines
            .iter()
            .map(|l| match &l.kind {
                LineKind::Plain(text) => text.clone(),
                LineKind::Directive { name, .. } => format!("#{name}"),
            })
            .collect();
        assert_eq!(kinds, ["#macro", "body", "#endmacro", "#let", "end"]);
    }
}
