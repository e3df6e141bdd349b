//! Rule-based fallback analysis per pattern kind.

mod common;

use common::{derive, pair_rows, row, structuring_rows};
use patternfinder_core::{
    analysis::{AnalysisSource, RiskLevel},
    fallback,
    patterns::{self, PatternKind, PatternSet},
};

fn detect(rows: Vec<serde_json::Map<String, serde_json::Value>>) -> PatternSet {
    patterns::detect_all(&derive(rows))
}

#[test]
fn ten_round_transfers_give_a_medium_round_amount_thread() {
    let set = detect(structuring_rows());
    let a = fallback::analyze(PatternKind::RoundAmounts, &set);

    assert_eq!(a.source, AnalysisSource::Fallback);
    assert_eq!(a.threads.len(), 1);
    let t = &a.threads[0];
    assert_eq!(t.risk_level, RiskLevel::Medium);
    assert_eq!(t.evidence[0], "10 round amount transactions");
    assert_eq!(t.confidence_score, Some(0.8));
    assert_eq!(a.risk_level, RiskLevel::Medium);
    assert!(a.error.is_none());
}

#[test]
fn round_amounts_just_under_ten_thousand_are_high() {
    let set = detect(vec![row("a", "S", "R", 9000.0, "2024-01-01 10:00:00")]);
    let a = fallback::analyze(PatternKind::RoundAmounts, &set);
    assert_eq!(a.risk_level, RiskLevel::High);
    assert_eq!(a.threads[0].potential_violation, "Structuring to avoid reporting requirements");
}

#[test]
fn few_ordinary_round_amounts_produce_nothing() {
    let set = detect(vec![
        row("a", "S", "R", 1000.0, "2024-01-01 10:00:00"),
        row("b", "S", "R", 2000.0, "2024-01-01 12:00:00"),
    ]);
    let a = fallback::analyze(PatternKind::RoundAmounts, &set);
    assert!(a.threads.is_empty());
    assert_eq!(a.risk_level, RiskLevel::Low);
}

#[test]
fn frequent_pair_risk_follows_transfer_count() {
    let mut rows = pair_rows("A", "B", 1000.0, 10, 3_600);
    rows.extend(pair_rows("C", "D", 250.0, 8, 3_600));
    rows.extend(pair_rows("E", "F", 75.5, 5, 3_600));
    rows.extend(pair_rows("G", "H", 10.0, 4, 3_600));
    let a = fallback::analyze(PatternKind::FrequentPairs, &detect(rows));

    assert_eq!(a.threads.len(), 3);
    assert_eq!(a.threads[0].risk_level, RiskLevel::High);
    assert!(a.threads[0].evidence[0].starts_with("Very high frequency"));
    assert!(a.threads[0].potential_violation.ends_with("with round amounts"));
    assert!(a.threads[0].evidence.iter().any(|e| e == "Identical amount on every transfer"));
    assert_eq!(a.threads[1].risk_level, RiskLevel::High);
    assert_eq!(a.threads[2].risk_level, RiskLevel::Medium);
    assert_eq!(a.threads[2].participants, vec!["E name", "F name"]);
    assert_eq!(a.risk_level, RiskLevel::High);
}

#[test]
fn busy_hour_is_flagged_as_activity_spike() {
    // 25 transfers in one hour among many quiet hours.
    let mut rows: Vec<_> = (0..25)
        .map(|i| row(&format!("b{i}"), &format!("S{i}"), "R", 100.0, &format!("2024-01-02 10:{:02}:00", i * 2)))
        .collect();
    rows.extend((0..20).map(|h| row(&format!("q{h}"), "Q", "R", 5.0, &format!("2024-01-03 {h:02}:30:00"))));
    let set = detect(rows);
    assert_eq!(set.high_activity_periods.len(), 1);

    let a = fallback::analyze(PatternKind::HighActivityPeriods, &set);
    assert_eq!(a.threads.len(), 1);
    assert_eq!(a.threads[0].risk_level, RiskLevel::High);
    assert_eq!(a.threads[0].evidence[0], "25 transactions in one hour");
}

#[test]
fn repeated_amount_needs_many_senders() {
    let one_sender = detect(pair_rows("A", "B", 123.45, 6, 3_600));
    assert!(fallback::analyze(PatternKind::RepeatedAmounts, &one_sender).threads.is_empty());

    let rows: Vec<_> = (0..6)
        .map(|i| row(&format!("t{i}"), &format!("S{}", i % 3), "R", 123.45, &format!("2024-01-01 {:02}:00:00", 8 + i)))
        .collect();
    let a = fallback::analyze(PatternKind::RepeatedAmounts, &detect(rows));
    assert_eq!(a.threads.len(), 1);
    assert_eq!(a.threads[0].risk_level, RiskLevel::Medium);
}

#[test]
fn rapid_sender_is_flagged_when_gaps_are_scripted() {
    // Four transfers 5 seconds apart: three quick-successive entries.
    let rows = pair_rows("BOT", "R", 40.0, 4, 5);
    let set = detect(rows);
    assert_eq!(set.quick_successive.len(), 3);

    let a = fallback::analyze(PatternKind::QuickSuccessive, &set);
    assert_eq!(a.threads.len(), 1);
    assert_eq!(a.threads[0].risk_level, RiskLevel::High);
    assert_eq!(a.threads[0].participants, vec!["BOT name", "R name"]);

    let slow = detect(pair_rows("P", "R", 40.0, 4, 120));
    let b = fallback::analyze(PatternKind::QuickSuccessive, &slow);
    assert_eq!(b.threads[0].risk_level, RiskLevel::Medium);
}

#[test]
fn empty_pattern_set_yields_low_risk_everywhere() {
    let set = PatternSet::default();
    for kind in PatternKind::ALL {
        let a = fallback::analyze(kind, &set);
        assert!(a.threads.is_empty(), "{kind}");
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert!(a.key_insights.is_some());
    }
}
