use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::{LineMarkerFormat, Options};

const TEST_SUFFIX: &str = ".test.f90";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Definitions in `-D` form: `NAME` or `NAME=EXPR`.
    #[serde(default)]
    pub defines: Vec<String>,

    /// Line markers in the compared output. Defaults to none.
    #[serde(default)]
    pub line_markers: Option<String>,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected error: the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// If set, the error must be reported on this 1-based line of the
    /// source below the frontmatter.
    #[serde(default)]
    pub expect_error_line: Option<u32>,
}

/// Parse a `.test.f90` file into its TOML config and preprocessor source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');

    let Some(after_open) = content.strip_prefix("---") else {
        return Err("missing opening --- frontmatter delimiter".into());
    };
    let after_open = after_open
        .strip_prefix('\n')
        .or_else(|| after_open.strip_prefix("\r\n"))
        .unwrap_or(after_open);

    let (toml_str, rest) = match after_open.strip_prefix("---") {
        Some(rest) => ("", rest),
        None => {
            let close_pos = after_open
                .find("\n---")
                .ok_or("missing closing --- frontmatter delimiter")?;
            (after_open[..close_pos].trim_end_matches('\r'), &after_open[close_pos + 4..])
        }
    };
    let source = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    let config: TestConfig = toml::from_str(toml_str).map_err(|e| format!("TOML parse error: {}", e))?;

    Ok((config, source))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

fn run_single_test(path: &Path) -> TestResult {
    let (description, outcome) = match std::fs::read_to_string(path) {
        Err(e) => (None, TestOutcome::Fail(format!("cannot read file: {}", e))),
        Ok(content) => match parse_test_file(&content) {
            Err(e) => (None, TestOutcome::Fail(format!("frontmatter error: {}", e))),
            Ok((config, source)) => {
                let outcome = match check(path, &config, source) {
                    Some(reason) => TestOutcome::Fail(reason),
                    None => TestOutcome::Pass,
                };
                (config.description, outcome)
            }
        },
    };
    TestResult {
        path: path.to_path_buf(),
        description,
        outcome,
    }
}

/// Run one test body. Returns `Some(reason)` on failure.
fn check(path: &Path, config: &TestConfig, source: &str) -> Option<String> {
    let mut options = Options::default();
    for definition in &config.defines {
        options.define(definition);
    }
    let format = match config.line_markers.as_deref().map(str::parse::<LineMarkerFormat>) {
        None => LineMarkerFormat::None,
        Some(Ok(format)) => format,
        Some(Err(e)) => return Some(format!("frontmatter error: {}", e)),
    };

    // Named after the test file so relative includes resolve beside it.
    let name = path.display().to_string();
    let result = interpreter::preprocess_source(&name, source, &options);

    match (&config.expect_error, &config.expect_output, result) {
        (Some(expected_err), _, Err(error)) => {
            let err_str = error.to_string();
            if !err_str.contains(expected_err.as_str()) {
                return Some(format!("expected error containing \"{}\", got: {}", expected_err, err_str));
            }
            match config.expect_error_line {
                Some(line) if error.location().line != line => Some(format!(
                    "expected error on line {}, but it is on line {}",
                    line,
                    error.location().line
                )),
                _ => None,
            }
        }
        (Some(expected_err), _, Ok(_)) => Some(format!(
            "expected error containing \"{}\", but preprocessing succeeded",
            expected_err
        )),
        (None, _, Err(error)) => Some(format!("unexpected error: {}", error)),
        (None, Some(expected_output), Ok(lines)) => {
            let actual = interpreter::render(&lines, format);
            let actual_trimmed = actual.trim();
            let expected_trimmed = expected_output.trim();
            if actual_trimmed == expected_trimmed {
                None
            } else {
                Some(format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected_trimmed),
                    indent(actual_trimmed)
                ))
            }
        }
        (None, None, Ok(_)) => None,
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {}", l)).collect::<Vec<_>>().join("\n")
}

/// Discover `.test.f90` files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(TEST_SUFFIX))
        {
            let category = path
                .parent()
                .and_then(|p| p.strip_prefix(root).ok())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

/// List available categories for the given test path.
pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (cat, files) in &categories {
        let label = if cat.is_empty() { "(root)" } else { cat.as_str() };
        eprintln!("  {} ({} tests)", label, files.len());
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn bold(s: &str, no_color: bool) -> String {
    if no_color { s.to_string() } else { format!("\x1b[1m{}\x1b[0m", s) }
}

fn label(result: &TestResult) -> &str {
    result
        .description
        .as_deref()
        .unwrap_or_else(|| result.path.file_stem().and_then(|s| s.to_str()).unwrap_or("?"))
}

/// Run all `.test.f90` files under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let run_categories: BTreeMap<String, Vec<PathBuf>> = if path.is_file() {
        BTreeMap::from([(String::new(), vec![path.to_path_buf()])])
    } else {
        let all_categories = discover_categorized(path);
        if all_categories.is_empty() {
            eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
            return 1;
        }
        select_categories(all_categories, categories)
    };

    if run_categories.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (cat, files) in &run_categories {
        if !path.is_file() {
            let header = if cat.is_empty() { "(root)" } else { cat.as_str() };
            eprintln!();
            eprintln!("{}", bold(header, no_color));
        }

        for file in files {
            let result = run_single_test(file);
            match &result.outcome {
                TestOutcome::Pass => {
                    passed += 1;
                    eprintln!("  {}  {}", pass_label(no_color), label(&result));
                }
                TestOutcome::Fail(_) => {
                    eprintln!("  {}  {}", fail_label(no_color), label(&result));
                    failures.push(result);
                }
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for f in &failures {
            eprintln!();
            eprintln!("  --- {} ---", f.path.display());
            if let TestOutcome::Fail(reason) = &f.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        let ok = if no_color { "ok" } else { "\x1b[32mok\x1b[0m" };
        eprintln!("test result: {}. {} passed, 0 failed", ok, passed);
        0
    } else {
        let bad = if no_color { "FAILED" } else { "\x1b[31mFAILED\x1b[0m" };
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            bad,
            passed,
            failed,
            passed + failed
        );
        1
    }
}

fn select_categories(
    all_categories: BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<String, Vec<PathBuf>> {
    if requested.is_empty() {
        return all_categories;
    }
    let mut filtered = BTreeMap::new();
    for req in requested {
        let req = req.trim_matches('/');
        let matching: Vec<&String> = all_categories
            .keys()
            .filter(|cat| *cat == req || cat.starts_with(&format!("{}/", req)))
            .collect();
        if matching.is_empty() {
            eprintln!(
                "warning: category '{}' not found (available: {})",
                req,
                all_categories
                    .keys()
                    .map(|k| if k.is_empty() { "(root)" } else { k.as_str() })
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        for cat in matching {
            filtered.insert(cat.clone(), all_categories[cat].clone());
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn frontmatter_is_split_from_source() {
        let (config, source) =
            parse_test_file("---\ndescription = \"x\"\ndefines = [\"N=2\"]\n---\n#if N\nok\n#endif\n").unwrap();
        assert_eq!(config.description.as_deref(), Some("x"));
        assert_eq!(config.defines, ["N=2"]);
        assert_eq!(source, "#if N\nok\n#endif\n");
        assert!(parse_test_file("no frontmatter").is_err());
        assert!(parse_test_file("---\nunknown = 1\n---\n").is_err());
    }

    #[test]
    fn passing_and_failing_tests() {
        let dir = tempfile::tempdir().unwrap();
        let pass = write_test(
            dir.path(),
            "loop.test.f90",
            "---\nexpect_output = \"\"\"\nx1\nx2\n\"\"\"\n---\n#do i = 1, 2\nx`i`\n#enddo\n",
        );
        let wrong = write_test(dir.path(), "wrong.test.f90", "---\nexpect_output = \"b\"\n---\na\n");
        let error = write_test(
            dir.path(),
            "error.test.f90",
            "---\nexpect_error = \"NameError\"\nexpect_error_line = 2\n---\nok\n`missing`\n",
        );

        assert!(matches!(run_single_test(&pass).outcome, TestOutcome::Pass));
        assert!(matches!(run_single_test(&wrong).outcome, TestOutcome::Fail(_)));
        assert!(matches!(run_single_test(&error).outcome, TestOutcome::Pass));
        assert_eq!(run_tests(dir.path(), true, &[]), 1);
    }

    #[test]
    fn categories_follow_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("macros")).unwrap();
        write_test(dir.path(), "a.test.f90", "---\n---\n");
        write_test(&dir.path().join("macros"), "b.test.f90", "---\n---\n");
        write_test(dir.path(), "notes.txt", "");

        let found = discover_categorized(dir.path());
        assert_eq!(found.keys().collect::<Vec<_>>(), ["", "macros"]);
        assert_eq!(run_tests(dir.path(), true, &["macros".to_string()]), 0);
    }

    #[test]
    fn workspace_golden_suite_passes() {
        let suite = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests");
        assert_eq!(run_tests(&suite, true, &[]), 0);
    }
}
