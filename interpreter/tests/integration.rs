use std::fs;

use interpreter::{InlineStyle, LineMarkerFormat, Options, preprocess_file, preprocess_source, render};
use tiel::parser::ErrorKind;

fn run_with(source: &str, options: &Options) -> Vec<String> {
    preprocess_source("main.f90", source, options)
        .expect("preprocessing failed")
        .into_iter()
        .map(|line| line.text)
        .collect()
}

fn run(source: &str) -> Vec<String> {
    run_with(source, &Options::default())
}

fn run_err(source: &str) -> interpreter::Error {
    preprocess_source("main.f90", source, &Options::default()).expect_err("expected an error")
}

// ---------------------------------------------------------------------------
// Conditionals and loops
// ---------------------------------------------------------------------------

#[test]
fn if_chain_takes_first_true_branch() {
    let src = "\
#let n = 5
#if n > 3
big
#elif n > 1
medium
#else
small
#endif
";
    assert_eq!(run(src), ["big"]);
}

#[test]
fn else_branch_when_nothing_matches() {
    assert_eq!(run("#if false\na\n#else if 0\nb\n#else\nc\n#end if\n"), ["c"]);
}

#[test]
fn non_boolean_condition_is_a_type_error() {
    let err = run_err("x\n#if 'yes'\ny\n#endif\n");
    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(err.location().line, 2);
}

#[test]
fn empty_do_range_emits_nothing_and_leaks_no_variable() {
    let src = "#do i = 5, 1\nbody\n#enddo\n`defined('i')`\n";
    assert_eq!(run(src), ["false"]);
}

#[test]
fn nested_loops_with_negative_step() {
    let src = "#do i = 2, 1, -1\n#do j = 1, i\n`i`.`j`\n#end do\n#end do\n";
    assert_eq!(run(src), ["2.1", "2.2", "1.1"]);
}

#[test]
fn index_marker_repeats_per_iteration() {
    assert_eq!(run("#do i = 0, 2\n@a,\n#enddo\n"), ["", "a,", "a, a,"]);
}

#[test]
fn index_marker_builds_array_slices() {
    let src = "#do r = 1, 3\nreal :: x`r`(@:)\n#enddo\n";
    assert_eq!(run(src), ["real :: x1(:)", "real :: x2(::)", "real :: x3(:::)"]);
}

#[test]
fn let_inside_a_loop_outlives_it() {
    let src = "#do i = 1, 3\n#let last = i\n#enddo\nlast = `last`\n";
    assert_eq!(run(src), ["last = 3"]);
}

#[test]
fn reserved_names_cannot_be_removed() {
    for name in ["__INDEX__", "__LINE__"] {
        let err = run_err(&format!("#do i = 1, 2\n#undef {name}\n#enddo\n"));
        assert_eq!(err.kind(), ErrorKind::Name);
        assert_eq!(err.location().line, 2);
    }
}

// ---------------------------------------------------------------------------
// Bindings and expressions
// ---------------------------------------------------------------------------

#[test]
fn let_and_functions() {
    let src = "\
#let kinds = [4, 8]
#let name(k) = 'real' + str(k)
#do i = 0, len(kinds) - 1
`name(kinds[i])`
#enddo
";
    assert_eq!(run(src), ["real4", "real8"]);
}

#[test]
fn dollar_names_and_comment_lines() {
    let src = "#let n = 3\nreal :: a$n, b$ n\n! kept as is: $n `n`\n";
    assert_eq!(run(src), ["real :: a3, b3", "! kept as is: $n `n`"]);
}

#[test]
fn oversized_repetition_is_an_error_not_a_crash() {
    let err = run_err("x = `'ab' * 9223372036854775807`\n");
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.location().line, 1);
}

#[test]
fn undef_of_unbound_name_is_a_name_error() {
    let err = run_err("#let a = 1\n#undef a, b\n");
    assert_eq!(err.kind(), ErrorKind::Name);
    assert_eq!(err.location().line, 2);
}

#[test]
fn angle_style_inline_expressions() {
    let options = Options {
        inline_style: InlineStyle::Angle,
        ..Options::default()
    };
    assert_eq!(run_with("#let x = 2\nvalue = <x*3>\n", &options), ["value = 6"]);
}

#[test]
fn file_and_line_are_reported() {
    assert_eq!(run("a `__LINE__`\n`__FILE__`\n"), ["a 1", "main.f90"]);
}

#[test]
fn command_line_definitions() {
    let mut options = Options::default();
    options.define("DEBUG");
    options.define("N=2+1");
    let src = "#if DEBUG\nn = `N`\n#endif\n";
    assert_eq!(run_with(src, &options), ["n = 3"]);
}

#[test]
fn continuation_joins_directive_lines() {
    let src = "#if 1 == &\n   & 1\nyes\n#endif\n";
    assert_eq!(run(src), ["yes"]);
}

// ---------------------------------------------------------------------------
// Line markers
// ---------------------------------------------------------------------------

#[test]
fn line_directive_remaps_following_lines() {
    let lines = preprocess_source("main.f90", "#line 100 \"foo.f90\"\nx\ny\n", &Options::default()).unwrap();
    assert_eq!(render(&lines, LineMarkerFormat::Fpp), "# 100 \"foo.f90\"\nx\ny\n");
}

#[test]
fn markers_follow_skipped_lines() {
    let lines = preprocess_source("main.f90", "a\n#if false\nb\n#endif\nc\n", &Options::default()).unwrap();
    assert_eq!(
        render(&lines, LineMarkerFormat::Cpp),
        "#line 1 \"main.f90\"\na\n#line 5 \"main.f90\"\nc\n"
    );
}

#[test]
fn plain_text_round_trips() {
    let src = "program p\n  implicit none\n\n  print *, 'a < b'\nend program p\n";
    let lines = preprocess_source("p.f90", src, &Options::default()).unwrap();
    assert_eq!(render(&lines, LineMarkerFormat::None), src);
}

#[test]
fn missing_final_newline_is_preserved() {
    let src = "program p\nend program p";
    let lines = preprocess_source("p.f90", src, &Options::default()).unwrap();
    assert_eq!(render(&lines, LineMarkerFormat::None), src);
}

#[test]
fn line_overrides_survive_an_include_with_its_own() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("b.f90"), "#line 5 \"bar.f90\"\ny\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "#line 100 \"foo.f90\"\nx\n#include \"b.f90\"\nz\n").unwrap();

    let lines = preprocess_file(&main, &Options::default()).unwrap();
    let located: Vec<_> = lines
        .iter()
        .map(|l| (l.text.as_str(), l.location.file.as_str(), l.location.line))
        .collect();
    assert_eq!(located, [("x", "foo.f90", 100), ("y", "bar.f90", 5), ("z", "foo.f90", 102)]);
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

#[test]
fn macro_templates_take_invocation_indent() {
    let src = "\
#macro b
B
#endmacro
#macro a
A
  #b
#endmacro
  #a
";
    assert_eq!(run(src), ["  A", "    B"]);
}

#[test]
fn first_matching_pattern_is_expanded() {
    let src = "\
#macro decl ^(?P<n>\\w+)\\s*:\\s*(?P<t>\\w+)$
`t` :: `n`
#pattern ^(?P<n>\\w+)$
real :: `n`
#endmacro
#decl x : integer
#decl y
";
    assert_eq!(run(src), ["integer :: x", "real :: y"]);
}

#[test]
fn unmatched_arguments_are_a_macro_match_error() {
    let err = run_err("#macro m ^\\d+$\nx\n#endmacro\n#m abc\n");
    assert_eq!(err.kind(), ErrorKind::MacroMatch);
    assert_eq!(err.location().line, 4);
}

#[test]
fn redefinition_is_a_name_error() {
    let err = run_err("#macro m\n#endmacro\n#macro m\n#endmacro\n");
    assert_eq!(err.kind(), ErrorKind::Name);
    assert_eq!(err.location().line, 3);
}

const SELECT: &str = "\
#macro select ^(?P<v>.*)$
select case (`v`)
#section case ^(?P<c>.*)$
case (`c`)
#section once default
case default
#finally
end select
#end macro
";

#[test]
fn construct_with_sections_and_finally() {
    let src = format!("{SELECT}#select x\n#case 1\na\n#case 2\nb\n#default\nc\n#end select\n");
    assert_eq!(
        run(&src),
        ["select case (x)", "case (1)", "a", "case (2)", "b", "case default", "c", "end select"]
    );
}

#[test]
fn once_section_cannot_repeat() {
    let src = format!("{SELECT}#select x\n#default\na\n#default\nb\n#end select\n");
    let err = run_err(&src);
    assert_eq!(err.kind(), ErrorKind::MacroMatch);
    assert_eq!(err.location().line, 13);
}

#[test]
fn sections_cannot_go_backwards() {
    let src = format!("{SELECT}#select x\n#default\na\n#case 1\nb\n#end select\n");
    assert_eq!(run_err(&src).kind(), ErrorKind::MacroMatch);
}

#[test]
fn macro_defined_by_an_expansion_is_callable() {
    let src = "#macro outer\n#macro inner\nx\n#end macro\n#end macro\n#outer\n#inner\n";
    assert_eq!(run(src), ["x"]);
}

#[test]
fn let_inside_a_template_outlives_the_expansion() {
    let src = "#macro setk ^(?P<k>\\d+)$\n#let wp = int(k)\n#end macro\n#setk 8\nwp = `wp`\n";
    assert_eq!(run(src), ["wp = 8"]);
}

#[test]
fn recursive_macro_hits_the_depth_limit() {
    let options = Options {
        max_expansion_depth: 8,
        ..Options::default()
    };
    let err = preprocess_source("main.f90", "#macro r\n#r\n#endmacro\n#r\n", &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExpansionDepth);
}

#[test]
fn unterminated_block_is_reported_at_its_opener() {
    let err = run_err("a\n#do i = 1, 2\nb\n");
    assert_eq!(err.kind(), ErrorKind::UnterminatedBlock);
    assert_eq!(err.location().line, 2);
}

// ---------------------------------------------------------------------------
// Includes
// ---------------------------------------------------------------------------

#[test]
fn include_splices_relative_to_including_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("inc.f90"), "included `__LINE__`\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "before\n#include \"inc.f90\"\nafter\n").unwrap();

    let lines = preprocess_file(&main, &Options::default()).unwrap();
    let text: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(text, ["before", "included 1", "after"]);
    assert!(lines[1].location.file.ends_with("inc.f90"));
}

#[test]
fn include_paths_are_searched() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let inc = dir.path().join("inc");
    fs::create_dir(&inc).unwrap();
    fs::write(inc.join("common.f90"), "#let shared = 7\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "#include <common.f90>\nx = `shared`\n").unwrap();

    let options = Options {
        include_paths: vec![inc],
        ..Options::default()
    };
    let lines = preprocess_file(&main, &options).unwrap();
    assert_eq!(lines[0].text, "x = 7");
}

#[test]
fn use_splices_a_file_once() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("defs.f90"), "#macro hello\nhello\n#endmacro\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "#use 'defs.f90'\n#use 'defs.f90'\n#hello\n").unwrap();

    let lines = preprocess_file(&main, &Options::default()).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "hello");
}

#[test]
fn used_file_contributes_definitions_only() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("defs.f90"), "#macro hello\nhello\n#end macro\n#hello\ntext\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "#use \"defs.f90\"\nbody\n#hello\n").unwrap();

    let lines = preprocess_file(&main, &Options::default()).unwrap();
    let text: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(text, ["body", "hello"]);
}

#[test]
fn block_may_close_in_an_included_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("tail.f90"), "inside\n#endif\n").unwrap();
    let main = dir.path().join("main.f90");
    fs::write(&main, "#if true\n#include \"tail.f90\"\nafter\n").unwrap();

    let lines = preprocess_file(&main, &Options::default()).unwrap();
    let text: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(text, ["inside", "after"]);
    assert!(lines[0].location.file.ends_with("tail.f90"));
}

#[test]
fn cyclic_include_is_reported() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    fs::write(dir.path().join("a.f90"), "#include \"b.f90\"\n").unwrap();
    fs::write(dir.path().join("b.f90"), "#include \"a.f90\"\n").unwrap();

    let err = preprocess_file(&dir.path().join("a.f90"), &Options::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CyclicInclude);
}

#[test]
fn missing_include_is_an_io_error() {
    let err = run_err("#include \"does-not-exist.f90\"\n");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.location().line, 1);
}
