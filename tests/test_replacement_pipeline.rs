//! End-to-End Replacement Pipeline Tests
//!
//! Exercises the full flow: parse the content stream, derive operator
//! records, extract spans, align spans to operators, plan a replacement,
//! and rewrite the stream. The rewritten output is then re-parsed to
//! verify that the replacement text reads back and that untouched
//! operators survived byte-for-byte.

use palimpsest::align::align_spans;
use palimpsest::content::{derive_operator_stream, parse_content_stream};
use palimpsest::fonts::{FontMetrics, FontResources};
use palimpsest::planner::{MatchPlanner, PlanError};
use palimpsest::rewriter::ContentStreamRewriter;
use palimpsest::spans::SpanExtractor;
use palimpsest::{Error, PlannerConfig, RewriterConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mono_resources() -> FontResources {
    FontResources::new().with_font("F1", FontMetrics::monospaced(500.0))
}

fn rewrite(stream: &[u8], target: &str, replacement: &str) -> palimpsest::Result<Vec<u8>> {
    init_logging();
    let resources = mono_resources();
    let page = derive_operator_stream(stream, &resources)?;
    let spans = SpanExtractor::new().extract(0, &page);
    let alignment = align_spans(&spans, &page);
    let plan = MatchPlanner::new(PlannerConfig::default())
        .build_replacement_plan(0, target, replacement, &page, &alignment)?;
    let outcome =
        ContentStreamRewriter::new(RewriterConfig::default()).apply(&plan, &page, stream, &resources)?;
    Ok(outcome.bytes)
}

fn extracted_text(stream: &[u8]) -> String {
    let page = derive_operator_stream(stream, &mono_resources()).unwrap();
    SpanExtractor::new()
        .extract(0, &page)
        .iter()
        .map(|s| s.text.as_str())
        .collect()
}

#[test]
fn test_replacement_reads_back_after_rewrite() {
    //! The rewritten stream must extract to the replacement text, not the
    //! original, when decoded through the same font resources.

    let stream = b"BT /F1 10 Tf 72 700 Td (meeting in Russia today) Tj ET";
    let out = rewrite(stream, "Russia", "Canada").unwrap();
    assert_eq!(extracted_text(&out), "meeting in Canada today");
}

#[test]
fn test_surrounding_operators_preserved_verbatim() {
    //! Operators the plan does not touch are spliced from the source
    //! bytes, preserving their exact spelling including odd whitespace.

    let stream = b"BT /F1 10 Tf 72 700 Td (before) Tj  0  -14  Td (Russia) Tj 0 -14 Td (after) Tj ET";
    let out = rewrite(stream, "Russia", "Canada").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("(before) Tj  0  -14  Td"), "{text}");
    assert!(text.contains("(Canada) Tj"), "{text}");
    assert!(text.contains("0 -14 Td (after) Tj ET"), "{text}");
}

#[test]
fn test_match_across_operator_boundary_with_whitespace() {
    //! "Russia" split as "(Rus) Tj ... ( sia) Tj" only matches when the
    //! relaxed pass skips the leading space at the operator boundary. The
    //! space must survive as context in the output.

    let stream = b"BT /F1 10 Tf 0 0 Td (Rus) Tj 20 0 Td ( sia) Tj ET";
    let out = rewrite(stream, "Russia", "Canada").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("(Can) Tj"), "{text}");
    assert!(text.contains("( ada) Tj"), "{text}");
}

#[test]
fn test_strict_mode_rejects_boundary_whitespace() {
    let stream = b"BT /F1 10 Tf 0 0 Td (Rus) Tj 20 0 Td ( sia) Tj ET";
    let resources = mono_resources();
    let page = derive_operator_stream(stream, &resources).unwrap();
    let spans = SpanExtractor::new().extract(0, &page);
    let alignment = align_spans(&spans, &page);
    let planner = MatchPlanner::new(PlannerConfig::new().with_relaxed_whitespace(false));
    let result = planner.build_replacement_plan(0, "Russia", "Canada", &page, &alignment);
    assert!(matches!(result, Err(PlanError::NotFound(_))));
}

#[test]
fn test_hex_string_rewrites_as_hex() {
    //! A target shown from a hex string keeps the hex spelling in the
    //! rewritten operator.

    let stream = b"BT /F1 10 Tf 0 0 Td <48656C6C6F> Tj ET";
    let out = rewrite(stream, "Hello", "Howdy").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("<486F776479> Tj"), "{text}");
    assert_eq!(extracted_text(text.as_bytes()), "Howdy");
}

#[test]
fn test_width_preserved_for_narrower_replacement() {
    //! Replacing a word with a narrower one must leave the pen advance of
    //! the line unchanged, so text after the replacement does not shift.

    let stream = b"BT /F1 10 Tf 0 0 Td (the long-term plan) Tj ET";
    let resources = mono_resources();
    let before = derive_operator_stream(stream, &resources).unwrap();
    let orig: f32 = before.records.iter().map(|r| r.advance.x).sum();

    let out = rewrite(stream, "long-term", "short").unwrap();
    let after = derive_operator_stream(&out, &resources).unwrap();
    let rewritten: f32 = after.records.iter().map(|r| r.advance.x).sum();
    assert!((orig - rewritten).abs() < 1e-3, "{orig} vs {rewritten}");
}

#[test]
fn test_sequential_replacements_compose() {
    //! A second replacement planned against the rewritten stream applies
    //! cleanly, which is how multi-target pages are processed.

    let stream = b"BT /F1 10 Tf 0 0 Td (alpha and omega) Tj ET";
    let once = rewrite(stream, "alpha", "gamma").unwrap();
    let twice = rewrite(&once, "omega", "delta").unwrap();
    assert_eq!(extracted_text(&twice), "gamma and delta");
}

#[test]
fn test_missing_target_reports_not_found() {
    let stream = b"BT /F1 10 Tf 0 0 Td (nothing here) Tj ET";
    let err = rewrite(stream, "absent", "present");
    assert!(matches!(
        err,
        Err(Error::Plan(PlanError::NotFound(ref t))) if t.as_str() == "absent"
    ));
}

#[test]
fn test_mixed_literal_kinds_isolated_per_segment() {
    //! A match spanning paren and hex strings cannot merge into one
    //! literal; each piece gets its own show op and keeps its kind.

    let stream = b"BT /F1 10 Tf 0 0 Td [(Rus) <736961>] TJ ET";
    let out = rewrite(stream, "Russia", "Canada").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("(Can) Tj"), "{text}");
    assert!(text.contains("<616461> Tj"), "{text}");
    assert_eq!(extracted_text(text.as_bytes()), "Canada");
}

#[test]
fn test_rewritten_operators_reparse_with_replacement_bytes() {
    //! The rewritten stream must tokenize back into well-formed operators
    //! whose show-text string operands carry the replacement bytes.

    let stream = b"BT /F1 10 Tf 0 0 Td (made in Russia) Tj ET";
    let out = rewrite(stream, "Russia", "Canada").unwrap();
    let operators = parse_content_stream(&out).unwrap();

    let shown: Vec<u8> = operators
        .iter()
        .filter(|raw| raw.op.is_show_text())
        .flat_map(|raw| raw.op.shown_strings())
        .flat_map(|s| s.bytes.clone())
        .collect();
    assert_eq!(shown, b"made in Canada");
}

#[test]
fn test_unknown_font_resource_is_an_error() {
    //! Rewriting through a font the resource table does not know cannot
    //! encode the replacement, so the whole apply aborts.

    let stream = b"BT /F9 10 Tf 0 0 Td (abc) Tj ET";
    let resources = mono_resources();
    let page = derive_operator_stream(stream, &resources).unwrap();
    let spans = SpanExtractor::new().extract(0, &page);
    let alignment = align_spans(&spans, &page);
    let plan = MatchPlanner::new(PlannerConfig::default())
        .build_replacement_plan(0, "abc", "xyz", &page, &alignment)
        .unwrap();
    let err = ContentStreamRewriter::new(RewriterConfig::default())
        .apply(&plan, &page, stream, &resources);
    assert!(matches!(err, Err(Error::Font(_))));
}
