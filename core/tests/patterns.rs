//! Detector tests: hand-built cases plus invariants checked across many
//! seeded synthetic ledgers.

mod common;

use common::{derive, pair_rows, row, structuring_rows};
use patternfinder_core::{
    features::RawTable,
    patterns::{self, PatternKind},
    stats, synth,
    transaction::DerivedTransaction,
};
use std::collections::HashMap;

fn synthetic(seed: u64, count: usize) -> Vec<DerivedTransaction> {
    let rows = synth::to_raw_rows(&synth::generate(seed, count));
    patternfinder_core::features::derive_table(&RawTable::from_rows(rows)).expect("synthetic rows derive")
}

const SEEDS: [u64; 8] = [1, 2, 3, 7, 42, 1234, 0xDEAD_BEEF, 987_654_321];

// ─────────────────────────────────────────────────────────────────────────────
// Invariants over synthetic ledgers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frequent_pairs_have_three_or_more_and_sort_descending() {
    for seed in SEEDS {
        let rows = synthetic(seed, 600);
        let pairs = patterns::frequent_pairs(&rows);
        assert!(!pairs.is_empty(), "seed {seed}: planted ring not found");
        assert!(pairs.iter().all(|p| p.transaction_count >= 3), "seed {seed}");
        assert!(
            pairs.windows(2).all(|w| w[0].transaction_count >= w[1].transaction_count),
            "seed {seed}: not sorted"
        );

        let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
        for r in &rows {
            *counts.entry((r.txn.sender_id.as_str(), r.txn.receiver_id.as_str())).or_default() += 1;
        }
        for p in &pairs {
            assert_eq!(counts[&(p.sender_id.as_str(), p.receiver_id.as_str())], p.transaction_count);
        }
        let expected = counts.values().filter(|c| **c >= 3).count();
        assert_eq!(pairs.len(), expected, "seed {seed}");
    }
}

#[test]
fn round_amounts_are_exactly_the_multiples_of_1000_in_order() {
    for seed in SEEDS {
        let rows = synthetic(seed, 600);
        let round = patterns::round_amounts(&rows);
        let found: Vec<&str> = round
            .iter()
            .map(|r| r.transaction_id.as_str())
            .collect();
        let expected: Vec<&str> = rows
            .iter()
            .filter(|r| r.amount() % 1000.0 == 0.0)
            .map(|r| r.id())
            .collect();
        assert_eq!(found.len(), expected.len(), "seed {seed}");
        assert_eq!(found, expected, "seed {seed}");
    }
}

#[test]
fn high_activity_buckets_exceed_the_90th_percentile() {
    for seed in SEEDS {
        let rows = synthetic(seed, 800);
        let mut hourly: HashMap<_, usize> = HashMap::new();
        for r in &rows {
            *hourly.entry(r.hour_bucket).or_default() += 1;
        }
        let counts: Vec<f64> = hourly.values().map(|c| *c as f64).collect();
        let p90 = stats::quantile(&counts, 0.9).unwrap();

        let periods = patterns::high_activity_periods(&rows);
        assert!(!periods.is_empty(), "seed {seed}: planted burst not found");
        for p in &periods {
            assert!(p.transaction_count as f64 > p90, "seed {seed}");
            assert_eq!(hourly[&p.time_period], p.transaction_count);
            assert!(p.sample_transactions.len() <= 5);
        }
    }
}

#[test]
fn quick_successive_entries_have_a_recent_same_sender_predecessor() {
    for seed in SEEDS {
        let rows = synthetic(seed, 600);
        let by_id: HashMap<&str, &DerivedTransaction> = rows.iter().map(|r| (r.id(), r)).collect();
        for q in patterns::quick_successive(&rows) {
            let cur = by_id[q.transaction_id.as_str()];
            let prev = by_id[q.previous_transaction_id.as_str()];
            assert_eq!(cur.txn.sender_id, prev.txn.sender_id);
            let gap = (cur.created_at() - prev.created_at()).num_seconds();
            assert!((0..=300).contains(&gap), "seed {seed}: gap {gap}");
            assert_eq!(q.time_diff_secs, gap as f64);

            // No same-sender transaction sits between the two.
            assert!(!rows.iter().any(|r| r.txn.sender_id == cur.txn.sender_id
                && r.created_at() > prev.created_at()
                && r.created_at() < cur.created_at()));
        }
    }
}

#[test]
fn repeated_amounts_count_exact_values() {
    for seed in SEEDS {
        let rows = synthetic(seed, 600);
        let repeated = patterns::repeated_amounts(&rows);
        assert!(repeated.windows(2).all(|w| w[0].frequency >= w[1].frequency));
        for r in &repeated {
            let n = rows.iter().filter(|t| t.amount() == r.amount).count();
            assert_eq!(n, r.frequency);
            assert!(r.frequency >= 3);
            assert!(r.sample_transactions.len() <= 3);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hand-built cases
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn structuring_pair_shows_up_as_frequent_pair_and_round_amounts() {
    let set = patterns::detect_all(&derive(structuring_rows()));

    assert_eq!(set.frequent_pairs.len(), 1);
    let pair = &set.frequent_pairs[0];
    assert_eq!(pair.transaction_count, 10);
    assert_eq!(pair.total_amount, 10_000.0);
    assert_eq!(pair.average_amount, 1000.0);
    assert_eq!(pair.amount_std, Some(0.0));
    assert_eq!(pair.sample_transactions.len(), 3);

    assert_eq!(set.round_amounts.len(), 10);
    assert_eq!(set.count(PatternKind::RoundAmounts), 10);
    assert!(set.quick_successive.is_empty());
}

#[test]
fn pair_statistics_use_sample_deviation() {
    let mut rows = pair_rows("A", "B", 100.0, 2, 600);
    rows.push(row("x", "A", "B", 400.0, "2024-03-01 11:00:00"));
    let pairs = patterns::frequent_pairs(&derive(rows));
    assert_eq!(pairs[0].total_amount, 600.0);
    assert_eq!(pairs[0].average_amount, 200.0);
    // Sample std of [100, 100, 400] is sqrt(30000).
    assert_eq!(pairs[0].amount_std, Some(173.21));
}

#[test]
fn equal_pair_counts_keep_key_order() {
    let mut rows = pair_rows("B", "C", 5.0, 3, 600);
    rows.extend(pair_rows("A", "C", 5.0, 3, 600));
    rows.extend(pair_rows("Z", "Y", 5.0, 4, 600));
    let pairs = patterns::frequent_pairs(&derive(rows));
    let keys: Vec<(&str, &str)> = pairs
        .iter()
        .map(|p| (p.sender_id.as_str(), p.receiver_id.as_str()))
        .collect();
    assert_eq!(keys, [("Z", "Y"), ("A", "C"), ("B", "C")]);
}

#[test]
fn quick_successive_window_is_inclusive_at_five_minutes() {
    let rows = vec![
        row("a", "S", "R", 1.0, "2024-03-01 10:00:00"),
        row("b", "S", "R", 1.0, "2024-03-01 10:05:00"),
        row("c", "S", "R", 1.0, "2024-03-01 10:10:01"),
        row("d", "T", "R", 1.0, "2024-03-01 10:10:02"),
    ];
    let quick = patterns::quick_successive(&derive(rows));
    assert_eq!(quick.len(), 1);
    assert_eq!(quick[0].transaction_id, "b");
    assert_eq!(quick[0].previous_transaction_id, "a");
    assert_eq!(quick[0].time_diff_secs, 300.0);
}

#[test]
fn uniform_hourly_activity_has_no_spikes() {
    // One transaction per hour: every bucket equals the 90th percentile.
    let rows = pair_rows("S", "R", 12.0, 24, 3_600);
    assert!(patterns::high_activity_periods(&derive(rows)).is_empty());
    assert!(patterns::high_activity_periods(&[]).is_empty());
}

#[test]
fn records_respect_limits_and_kind() {
    let set = patterns::detect_all(&derive(structuring_rows()));
    let records = set.records(PatternKind::RoundAmounts, 4);
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.kind() == PatternKind::RoundAmounts));
    assert_eq!(
        set.non_empty_kinds(),
        [PatternKind::FrequentPairs, PatternKind::RoundAmounts, PatternKind::RepeatedAmounts]
    );
}
