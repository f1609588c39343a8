use interpreter::{LineMarkerFormat, Options, preprocess_source, render};
use proptest::prelude::*;

/// Lines with no directive marker, inline marker or index marker.
fn plain_line() -> impl Strategy<Value = String> {
    "[a-z0-9 =+*(),.:'!]{0,24}"
}

proptest! {
    /// Text without directives or markers comes out unchanged.
    #[test]
    fn plain_text_is_identity(lines in prop::collection::vec(plain_line(), 0..12), tail in plain_line()) {
        // `tail` is an unterminated last line when non-empty.
        let mut source: String = lines.iter().map(|l| format!("{l}\n")).collect();
        source.push_str(&tail);
        let output = preprocess_source("p.f90", &source, &Options::default()).unwrap();
        prop_assert_eq!(render(&output, LineMarkerFormat::None), source);
    }
}

proptest! {
    /// Two runs over the same input agree, markers included.
    #[test]
    fn runs_are_deterministic(count in 0i64..6, text in plain_line()) {
        let source = format!("#do i = 1, {count}\n{text} `i`\n#enddo\n");
        let first = preprocess_source("d.f90", &source, &Options::default()).unwrap();
        let second = preprocess_source("d.f90", &source, &Options::default()).unwrap();
        prop_assert_eq!(first.len(), count as usize);
        prop_assert_eq!(
            render(&first, LineMarkerFormat::Fpp),
            render(&second, LineMarkerFormat::Fpp)
        );
    }
}

proptest! {
    /// Arbitrary input yields output or an error, never a panic.
    #[test]
    fn arbitrary_input_does_not_panic(s in "\\PC*") {
        let _ = preprocess_source("fuzz.f90", &s, &Options::default());
    }
}
