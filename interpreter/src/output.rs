use std::fmt::Write as _;
use std::str::FromStr;

use tiel::location::SourceLocation;

/// One emitted line with the location it is reported at.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    pub location: SourceLocation,
    pub text: String,
    /// False only for the last line of a run whose source ended without a
    /// line terminator.
    pub newline: bool,
}

/// How line markers are written into the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMarkerFormat {
    /// `# N "file"`
    #[default]
    Fpp,
    /// `#line N "file"`
    Cpp,
    None,
}

impl FromStr for LineMarkerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fpp" => Ok(LineMarkerFormat::Fpp),
            "cpp" => Ok(LineMarkerFormat::Cpp),
            "none" => Ok(LineMarkerFormat::None),
            other => Err(format!("unknown line marker format `{other}` (expected fpp, cpp or none)")),
        }
    }
}

/// Join output lines into text, inserting a line marker before the first
/// line and wherever the next line does not directly follow the previous
/// one in the same file.
pub fn render(lines: &[OutputLine], format: LineMarkerFormat) -> String {
    let mut out = String::new();
    let mut previous: Option<&SourceLocation> = None;

    for line in lines {
        let continuous = previous.is_some_and(|p| line.location.follows(p));
        if !continuous {
            let SourceLocation { file, line: number } = &line.location;
            // Writing to a String cannot fail.
            let _ = match format {
                LineMarkerFormat::Fpp => writeln!(out, "# {number} \"{file}\""),
                LineMarkerFormat::Cpp => writeln!(out, "#line {number} \"{file}\""),
                LineMarkerFormat::None => Ok(()),
            };
        }
        out.push_str(&line.text);
        if line.newline {
            out.push('\n');
        }
        previous = Some(&line.location);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(file: &str, number: u32, text: &str) -> OutputLine {
        OutputLine {
            location: SourceLocation::new(file, number),
            text: text.to_string(),
            newline: true,
        }
    }

    #[test]
    fn markers_at_start_and_discontinuities() {
        let lines = vec![line("a.f90", 1, "x"), line("a.f90", 2, "y"), line("a.f90", 5, "z"), line("b.f90", 6, "w")];
        assert_eq!(
            render(&lines, LineMarkerFormat::Fpp),
            "# 1 \"a.f90\"\nx\ny\n# 5 \"a.f90\"\nz\n# 6 \"b.f90\"\nw\n"
        );
    }

    #[test]
    fn cpp_and_none_formats() {
        let lines = vec![line("a.f90", 3, "x")];
        assert_eq!(render(&lines, LineMarkerFormat::Cpp), "#line 3 \"a.f90\"\nx\n");
        assert_eq!(render(&lines, LineMarkerFormat::None), "x\n");
        assert_eq!(render(&[], LineMarkerFormat::Fpp), "");
    }

    #[test]
    fn repeated_locations_get_new_markers() {
        let lines = vec![line("a", 2, "x"), line("a", 2, "x")];
        assert_eq!(render(&lines, LineMarkerFormat::Cpp), "#line 2 \"a\"\nx\n#line 2 \"a\"\nx\n");
    }

    #[test]
    fn unterminated_last_line_stays_unterminated() {
        let mut lines = vec![line("a", 1, "x"), line("a", 2, "y")];
        lines[1].newline = false;
        assert_eq!(render(&lines, LineMarkerFormat::None), "x\ny");
    }

    #[test]
    fn parses_format_names() {
        assert_eq!("CPP".parse::<LineMarkerFormat>(), Ok(LineMarkerFormat::Cpp));
        assert!("gcc".parse::<LineMarkerFormat>().is_err());
    }
}
