//! The response parser must turn any model output into a usable analysis.

mod common;

use common::analysis_json;
use patternfinder_core::{
    analysis::{self, AnalysisSource, RiskLevel},
    parser::{self, ParseError, DEFAULT_SUMMARY},
    patterns::PatternKind,
};

const KIND: PatternKind = PatternKind::FrequentPairs;

#[test]
fn never_panics_and_always_yields_a_summary() {
    let inputs = [
        "",
        "   ",
        "{",
        "}",
        "}{",
        "{\"threads\": [",
        "{\"threads\": \"not a list\", \"risk_level\": 7}",
        "[1, 2, 3]",
        "null",
        "{\"summary\": null}",
        "```json\n{\"threads\": [{}]}\n```",
        "{\"threads\": [null, 3, \"x\", {\"risk_level\": \"HIGH\"}]}",
        "The model declined to answer.",
        "\u{1F600} {\"summary\": \"emoji \u{1F600}\"} \u{1F600}",
    ];
    for input in inputs {
        let analysis = parser::parse_response(input, KIND);
        assert!(!analysis.summary.is_empty(), "empty summary for {input:?}");
    }
}

#[test]
fn well_formed_json_is_read_as_model_output() {
    let text = format!(
        "Sure, here is the analysis:\n```json\n{}\n```\nLet me know if you need more.",
        analysis_json("high", &[("t1", "high"), ("t2", "low")])
    );
    let a = parser::parse_response(&text, KIND);
    assert_eq!(a.source, AnalysisSource::Model);
    assert_eq!(a.risk_level, RiskLevel::High);
    assert_eq!(a.summary, "Model summary");
    assert_eq!(a.threads.len(), 2);
    assert_eq!(a.threads[0].thread_id, "t1");
    assert_eq!(a.threads[0].confidence_score, Some(0.9));
    assert_eq!(a.threads[1].risk_level, RiskLevel::Low);
    assert_eq!(a.key_insights, Some(vec!["k1".to_string()]));
}

#[test]
fn incomplete_json_is_back_filled() {
    let a = parser::parse_structured(r#"{"threads": [{"description": "x"}]}"#, KIND).unwrap();
    assert_eq!(a.risk_level, RiskLevel::Medium);
    assert_eq!(a.summary, DEFAULT_SUMMARY);
    assert_eq!(a.threads[0].thread_id, "frequent_pairs_1");
    assert_eq!(a.threads[0].potential_violation, "Unknown");
    assert!(a.threads[0].participants.is_empty());
    assert_eq!(a.key_insights, None);
}

#[test]
fn lenient_field_types() {
    let text = r#"{"risk_level": "Critical", "threads": [{
        "thread_id": 17, "participants": "Alice", "evidence": ["a", 2, null],
        "risk_level": "moderate risk", "confidence_score": "1.7"
    }]}"#;
    let a = parser::parse_structured(text, KIND).unwrap();
    assert_eq!(a.risk_level, RiskLevel::High);
    let t = &a.threads[0];
    assert_eq!(t.thread_id, "17");
    assert_eq!(t.participants, vec!["Alice"]);
    assert_eq!(t.evidence, vec!["a", "2"]);
    assert_eq!(t.risk_level, RiskLevel::Medium);
    assert_eq!(t.confidence_score, Some(1.0));
}

#[test]
fn echoed_schema_placeholder_is_not_read_as_high() {
    let text = r#"{"threads": [{"thread_id": "t1", "risk_level": "high | medium | low"}],
        "risk_level": "high | medium | low", "summary": "s"}"#;
    let a = parser::parse_response(text, KIND);
    assert_eq!(a.source, AnalysisSource::Model);
    assert_eq!(a.risk_level, RiskLevel::Medium);
    assert_eq!(a.threads[0].risk_level, RiskLevel::Medium);

    let b = parser::parse_response(text, PatternKind::RoundAmounts);
    assert_ne!(analysis::overall_risk(&[a.risk_level, b.risk_level]), RiskLevel::High);
}

#[test]
fn structured_parse_errors_are_typed() {
    assert_eq!(parser::parse_structured("no braces", KIND).unwrap_err(), ParseError::NoJsonObject);
    assert!(matches!(parser::parse_structured("{oops}", KIND), Err(ParseError::Json(_))));
}

#[test]
fn free_text_with_keywords_becomes_one_medium_thread() {
    let text = "There is a highly suspicious pattern of transfers between A and B. ".repeat(5);
    let a = parser::parse_response(&text, PatternKind::RoundAmounts);
    assert_eq!(a.source, AnalysisSource::ModelText);
    assert_eq!(a.risk_level, RiskLevel::High);
    assert_eq!(a.threads.len(), 1);
    let t = &a.threads[0];
    assert_eq!(t.thread_id, "round_amounts_text_1");
    assert_eq!(t.risk_level, RiskLevel::Medium);
    assert!(t.evidence[0].ends_with("..."));
    assert_eq!(t.evidence[0].chars().count(), 103);
    assert!(a.summary.chars().count() <= 203);
}

#[test]
fn free_text_without_keywords_has_no_threads() {
    let a = parser::parse_response("Everything looks fine. Low risk overall.", KIND);
    // "risk" is itself a keyword.
    assert_eq!(a.threads.len(), 1);
    assert_eq!(a.risk_level, RiskLevel::Low);

    let b = parser::parse_response("All clear.", KIND);
    assert!(b.threads.is_empty());
    assert_eq!(b.risk_level, RiskLevel::Medium);
    assert_eq!(b.summary, "All clear.");

    let empty = parser::parse_response("", KIND);
    assert!(empty.threads.is_empty());
    assert_eq!(empty.summary, "No analysis text returned");
}
