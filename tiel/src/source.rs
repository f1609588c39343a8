use std::collections::HashMap;
use std::ops::Range;

use codespan_reporting::files::{Files, SimpleFiles};

use crate::location::SourceLocation;

/// Every source text read during a run, keyed by the name used in
/// [`SourceLocation::file`]. Backs codespan diagnostics.
#[derive(Default)]
pub struct SourceMap {
    files: SimpleFiles<String, String>,
    ids: HashMap<String, usize>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Register a source text. Re-registering a name returns the existing id.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(&id) = self.ids.get(&name) {
            return id;
        }
        let id = self.files.add(name.clone(), source.into());
        self.ids.insert(name, id);
        id
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// The file id and byte range of the line a location points at, when
    /// that file was loaded in this run.
    pub fn line_span(&self, location: &SourceLocation) -> Option<(usize, Range<usize>)> {
        let id = self.id(&location.file)?;
        let index = (location.line as usize).checked_sub(1)?;
        let range = self.files.line_range(id, index).ok()?;
        // Drop the trailing newline so labels underline only the text.
        let source = self.files.get(id).ok()?.source();
        let text = source.get(range.clone()).unwrap_or("");
        let trimmed = text.trim_end_matches(['\n', '\r']).len();
        Some((id, range.start..range.start + trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_per_name() {
        let mut map = SourceMap::new();
        let a = map.add("a.f90", "x\n");
        let b = map.add("a.f90", "ignored\n");
        assert_eq!(a, b);
    }

    #[test]
    fn line_span_covers_line_text() {
        let mut map = SourceMap::new();
        map.add("a.f90", "first\nsecond\n");
        let (_, span) = map.line_span(&SourceLocation::new("a.f90", 2)).unwrap();
        assert_eq!(span, 6..12);
        assert!(map.line_span(&SourceLocation::new("missing.f90", 1)).is_none());
    }
}
