mod common;

use common::{derive, pair_rows, row};
use patternfinder_core::summary::{build_summary, SummaryStats};
use serde_json::json;

#[test]
fn empty_input_yields_zeroed_summary() {
    let s = build_summary(&[]);
    assert_eq!(s, SummaryStats::default());
    assert_eq!(s.total_transactions, 0);
    assert!(s.date_range.is_none());
    assert!(s.top_amounts.is_empty());
}

#[test]
fn totals_uniques_and_range() {
    let mut rows = pair_rows("A", "B", 100.0, 3, 600);
    rows.push(row("x", "C", "B", 400.0, "2024-02-28 09:00:00"));
    let s = build_summary(&derive(rows));

    assert_eq!(s.total_transactions, 4);
    assert_eq!(s.unique_senders, 2);
    assert_eq!(s.unique_receivers, 1);
    assert_eq!(s.total_amount, 700.0);
    assert_eq!(s.average_amount, 175.0);
    let range = s.date_range.unwrap();
    assert_eq!(patternfinder_core::timefmt::display(&range.start), "2024-02-28 09:00:00");
    assert_eq!(patternfinder_core::timefmt::display(&range.end), "2024-03-01 10:20:00");
}

#[test]
fn breakdowns_are_most_common_first_and_capped() {
    let mut rows = Vec::new();
    for i in 0..12 {
        // Sender counts: S4=10, S3=8, S6=7, S2=6, S5=6, S1=4, S0=2.
        for j in 0..=i % 7 {
            let mut r = row(&format!("t{i}-{j}"), &format!("S{}", i % 7), "R", (i * 10 + j) as f64, "2024-01-01 10:00:00");
            if j == 0 {
                r.insert("payment_status".into(), json!("failed"));
            }
            rows.push(r);
        }
    }
    let s = build_summary(&derive(rows));

    assert_eq!(s.top_senders_by_count.len(), 5);
    assert!(s.top_senders_by_count.windows(2).all(|w| w[0].count >= w[1].count));
    assert_eq!(s.top_senders_by_count[0].value, "S4 name");
    assert_eq!(s.top_amounts.len(), 10);
    assert!(s.top_amounts.windows(2).all(|w| w[0].count >= w[1].count));

    let statuses: Vec<(&str, usize)> =
        s.payment_statuses.iter().map(|v| (v.value.as_str(), v.count)).collect();
    assert_eq!(statuses.iter().map(|(_, c)| c).sum::<usize>(), s.total_transactions);
    assert!(statuses.contains(&("failed", 12)));
}
