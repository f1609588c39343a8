use std::collections::HashMap;
use std::fmt;

/// A line in a source file. Lines are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }

    pub fn next_line(&self) -> Self {
        SourceLocation {
            file: self.file.clone(),
            line: self.line.saturating_add(1),
        }
    }

    /// True if `self` is the line directly after `previous` in the same file.
    pub fn follows(&self, previous: &SourceLocation) -> bool {
        self.file == previous.file && previous.line.checked_add(1) == Some(self.line)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// An active `line` directive: physical lines at or after `anchor` in the
/// anchor's file are reported as `target_file:target_line + offset`.
#[derive(Debug, Clone, PartialEq)]
struct LineOverride {
    anchor: SourceLocation,
    target_file: String,
    target_line: u32,
}

/// Maps physical source positions to the positions reported in output and
/// diagnostics, honouring `line` directives. Each physical file keeps its
/// own override, so a `line` directive in an included file leaves the
/// including file's mapping alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationTracker {
    overrides: HashMap<String, LineOverride>,
}

impl LocationTracker {
    pub fn new() -> Self {
        LocationTracker::default()
    }

    /// Install an override so that the physical line after `directive` is
    /// reported as `line` in `file` (or in the currently mapped file).
    pub fn set_override(&mut self, directive: &SourceLocation, line: u32, file: Option<String>) {
        let target_file = match file {
            Some(file) => file,
            None => self.map(directive).file,
        };
        self.overrides.insert(
            directive.file.clone(),
            LineOverride {
                anchor: directive.next_line(),
                target_file,
                target_line: line,
            },
        );
    }

    pub fn map(&self, location: &SourceLocation) -> SourceLocation {
        match self.overrides.get(&location.file) {
            Some(o) if location.line >= o.anchor.line => SourceLocation {
                file: o.target_file.clone(),
                line: o.target_line.saturating_add(location.line - o.anchor.line),
            },
            _ => location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_locations_pass_through() {
        let tracker = LocationTracker::new();
        let loc = SourceLocation::new("a.f90", 7);
        assert_eq!(tracker.map(&loc), loc);
    }

    #[test]
    fn override_applies_from_the_next_line() {
        let mut tracker = LocationTracker::new();
        tracker.set_override(&SourceLocation::new("a.f90", 3), 100, Some("foo.f90".into()));

        assert_eq!(tracker.map(&SourceLocation::new("a.f90", 2)), SourceLocation::new("a.f90", 2));
        assert_eq!(tracker.map(&SourceLocation::new("a.f90", 4)), SourceLocation::new("foo.f90", 100));
        assert_eq!(tracker.map(&SourceLocation::new("a.f90", 6)), SourceLocation::new("foo.f90", 102));
        assert_eq!(tracker.map(&SourceLocation::new("b.f90", 9)), SourceLocation::new("b.f90", 9));
    }

    #[test]
    fn override_without_file_keeps_mapped_file() {
        let mut tracker = LocationTracker::new();
        tracker.set_override(&SourceLocation::new("a.f90", 1), 10, Some("x.f90".into()));
        tracker.set_override(&SourceLocation::new("a.f90", 5), 50, None);
        assert_eq!(tracker.map(&SourceLocation::new("a.f90", 6)), SourceLocation::new("x.f90", 50));
    }

    #[test]
    fn overrides_are_kept_per_file() {
        let mut tracker = LocationTracker::new();
        tracker.set_override(&SourceLocation::new("main.f90", 1), 100, Some("foo.f90".into()));
        tracker.set_override(&SourceLocation::new("b.f90", 1), 5, Some("bar.f90".into()));

        assert_eq!(tracker.map(&SourceLocation::new("b.f90", 2)), SourceLocation::new("bar.f90", 5));
        assert_eq!(tracker.map(&SourceLocation::new("main.f90", 4)), SourceLocation::new("foo.f90", 102));
    }

    #[test]
    fn follows_requires_same_file() {
        let a = SourceLocation::new("a", 1);
        assert!(SourceLocation::new("a", 2).follows(&a));
        assert!(!SourceLocation::new("b", 2).follows(&a));
        assert!(!SourceLocation::new("a", 3).follows(&a));
    }
}
