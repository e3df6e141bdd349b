//! Rule-based fallback analysis.
//!
//! Used when no model is configured or a model call fails. Rules mirror the
//! monitoring thresholds an analyst would apply by hand:
//!   - Frequent pairs:   5+ transfers qualify; 8+ is high risk
//!   - Round amounts:    $9,000-$9,999 is high; $4,000-$4,999 or 3+ records is medium
//!   - Activity spikes:  >10 per hour qualifies; >20 or >$100k is high
//!   - Repeated amounts: 5+ uses across 3+ senders; 10+ is high
//!   - Quick successive: 3+ quick transfers by one sender; <10s gap or 6+ is high
//!
//! Every fallback thread carries a confidence score and a recommended action.

use crate::{
    analysis::{AnalysisSource, AnalysisThread, PatternAnalysis, RiskLevel},
    patterns::{self, PatternKind, PatternSet, QuickSuccessive},
};

// ── Constants ────────────────────────────────────────────────────────────────

const PAIRS_EXAMINED: usize = 5;
const PAIR_MIN_COUNT: usize = 5;
const PAIR_HIGH_COUNT: usize = 8;
const PAIR_VERY_HIGH_COUNT: usize = 10;
const PAIR_HIGH_VOLUME: f64 = 50_000.0;
const PAIR_MODERATE_VOLUME: f64 = 10_000.0;

const ROUND_MIN_RECORDS: usize = 3;
const ROUND_LISTED: usize = 10;
const MANY_ROUND_USERS: usize = 5;

const PERIODS_EXAMINED: usize = 3;
const PERIOD_MIN_COUNT: usize = 10;
const PERIOD_HIGH_COUNT: usize = 20;
const PERIOD_HIGH_VOLUME: f64 = 100_000.0;

const REPEATED_EXAMINED: usize = 5;
const REPEATED_MIN_FREQUENCY: usize = 5;
const REPEATED_MIN_SENDERS: usize = 3;
const REPEATED_HIGH_FREQUENCY: usize = 10;

const QUICK_SENDERS_LISTED: usize = 5;
const QUICK_MIN_ENTRIES: usize = 3;
const QUICK_HIGH_ENTRIES: usize = 6;
const QUICK_SCRIPTED_GAP_SECS: f64 = 10.0;

fn in_band(amount: f64, lo: f64, hi: f64) -> bool {
    amount >= lo && amount <= hi
}

fn unique_in_order<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

// ── Rules per pattern kind ───────────────────────────────────────────────────

fn frequent_pair_threads(set: &PatternSet) -> Vec<AnalysisThread> {
    set.frequent_pairs
        .iter()
        .take(PAIRS_EXAMINED)
        .enumerate()
        .filter(|(_, pair)| pair.transaction_count >= PAIR_MIN_COUNT)
        .map(|(i, pair)| {
            let count = pair.transaction_count;
            let (risk_level, mut evidence, mut violation) = if count >= PAIR_VERY_HIGH_COUNT {
                (
                    RiskLevel::High,
                    vec![format!("Very high frequency: {count} transactions")],
                    "High-frequency layering scheme".to_string(),
                )
            } else if count >= PAIR_HIGH_COUNT {
                (
                    RiskLevel::High,
                    vec![format!("High frequency: {count} transactions")],
                    "Potential layering scheme".to_string(),
                )
            } else {
                (
                    RiskLevel::Medium,
                    vec![format!("Moderate frequency: {count} transactions")],
                    "Potential structuring".to_string(),
                )
            };

            evidence.push(format!(
                "Total amount: ${:.2} (average ${:.2})",
                pair.total_amount, pair.average_amount
            ));
            if pair.total_amount > PAIR_HIGH_VOLUME {
                evidence.push(format!("High total volume: ${:.2}", pair.total_amount));
            } else if pair.total_amount > PAIR_MODERATE_VOLUME {
                evidence.push(format!("Moderate total volume: ${:.2}", pair.total_amount));
            }
            if pair.average_amount != 0.0 && patterns::is_round_amount(pair.average_amount) {
                evidence.push(format!("Round average amount: ${:.2}", pair.average_amount));
                violation.push_str(" with round amounts");
            }
            if pair.amount_std == Some(0.0) {
                evidence.push("Identical amount on every transfer".to_string());
            }

            AnalysisThread {
                thread_id: format!("fallback_freq_{i}"),
                description: format!(
                    "High frequency transactions between {} and {} ({} transactions, ${:.2} total)",
                    pair.sender_name, pair.receiver_name, count, pair.total_amount
                ),
                participants: unique_in_order(
                    [pair.sender_name.as_str(), pair.receiver_name.as_str()].into_iter(),
                ),
                risk_level,
                evidence,
                transactions_involved: pair
                    .sample_transactions
                    .iter()
                    .map(|t| t.transaction_id.clone())
                    .collect(),
                potential_violation: violation,
                confidence_score: Some(0.7),
                recommended_action: Some(
                    "Review transaction history and consider enhanced monitoring".to_string(),
                ),
            }
        })
        .collect()
}

fn round_amount_threads(set: &PatternSet) -> Vec<AnalysisThread> {
    let records = &set.round_amounts;
    let under_10k = records.iter().filter(|r| in_band(r.amount, 9000.0, 9999.0)).count();
    let under_5k = records.iter().filter(|r| in_band(r.amount, 4000.0, 4999.0)).count();

    if under_10k == 0 && under_5k == 0 && records.len() < ROUND_MIN_RECORDS {
        return Vec::new();
    }

    let users = unique_in_order(records.iter().map(|r| r.sender_name.as_str()));
    let mut evidence = vec![format!("{} round amount transactions", records.len())];
    let mut risk_level = RiskLevel::Medium;
    let mut violation = "Potential structuring";

    if under_10k > 0 {
        evidence.push(format!("{under_10k} transactions just under $10,000 threshold"));
        risk_level = RiskLevel::High;
        violation = "Structuring to avoid reporting requirements";
    }
    if under_5k > 0 {
        evidence.push(format!("{under_5k} transactions just under $5,000 threshold"));
    }
    if users.len() > MANY_ROUND_USERS {
        evidence.push(format!(
            "Multiple users ({}) involved in round amount transactions",
            users.len()
        ));
    }

    vec![AnalysisThread {
        thread_id: "fallback_round_0".to_string(),
        description: format!(
            "Round amount transactions detected ({} transactions across {} users)",
            records.len(),
            users.len()
        ),
        participants: users.into_iter().take(ROUND_LISTED).collect(),
        risk_level,
        evidence,
        transactions_involved: records
            .iter()
            .take(ROUND_LISTED)
            .map(|r| r.transaction_id.clone())
            .collect(),
        potential_violation: violation.to_string(),
        confidence_score: Some(0.8),
        recommended_action: Some(
            "Review for potential structuring patterns and consider enhanced monitoring".to_string(),
        ),
    }]
}

fn high_activity_threads(set: &PatternSet) -> Vec<AnalysisThread> {
    set.high_activity_periods
        .iter()
        .take(PERIODS_EXAMINED)
        .enumerate()
        .filter(|(_, p)| p.transaction_count > PERIOD_MIN_COUNT || p.total_amount > PERIOD_HIGH_VOLUME)
        .map(|(i, period)| {
            let high_volume = period.total_amount > PERIOD_HIGH_VOLUME;
            let risk_level = if period.transaction_count > PERIOD_HIGH_COUNT || high_volume {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            };
            let mut evidence = vec![
                format!("{} transactions in one hour", period.transaction_count),
                format!("Total amount: ${:.2}", period.total_amount),
                format!("Unique senders: {}", period.unique_senders),
            ];
            if high_volume {
                evidence.push("High-value transaction concentration".to_string());
            }

            AnalysisThread {
                thread_id: format!("fallback_activity_{i}"),
                description: format!(
                    "Unusual activity spike at {}: {} transactions in one hour (${:.2} total)",
                    crate::timefmt::display(&period.time_period),
                    period.transaction_count,
                    period.total_amount
                ),
                participants: unique_in_order(
                    period.sample_transactions.iter().map(|t| t.sender_name.as_str()),
                ),
                risk_level,
                evidence,
                transactions_involved: period
                    .sample_transactions
                    .iter()
                    .map(|t| t.transaction_id.clone())
                    .collect(),
                potential_violation: "Coordinated suspicious activity".to_string(),
                confidence_score: Some(0.6),
                recommended_action: Some(
                    "Investigate coordinated activity and timing patterns".to_string(),
                ),
            }
        })
        .collect()
}

fn repeated_amount_threads(set: &PatternSet) -> Vec<AnalysisThread> {
    set.repeated_amounts
        .iter()
        .take(REPEATED_EXAMINED)
        .enumerate()
        .filter(|(_, r)| r.frequency >= REPEATED_MIN_FREQUENCY && r.unique_senders >= REPEATED_MIN_SENDERS)
        .map(|(i, rep)| AnalysisThread {
            thread_id: format!("fallback_repeated_{i}"),
            description: format!(
                "Amount ${:.2} repeated {} times across {} senders",
                rep.amount, rep.frequency, rep.unique_senders
            ),
            participants: unique_in_order(
                rep.sample_transactions.iter().map(|t| t.sender_name.as_str()),
            ),
            risk_level: if rep.frequency >= REPEATED_HIGH_FREQUENCY {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            },
            evidence: vec![
                format!("{} transactions of exactly ${:.2}", rep.frequency, rep.amount),
                format!("{} distinct senders", rep.unique_senders),
                format!("{} distinct receivers", rep.unique_receivers),
            ],
            transactions_involved: rep
                .sample_transactions
                .iter()
                .map(|t| t.transaction_id.clone())
                .collect(),
            potential_violation: "Possible coordinated or scripted transfers".to_string(),
            confidence_score: Some(0.5),
            recommended_action: Some(
                "Check whether the amount matches a known product price; otherwise review senders"
                    .to_string(),
            ),
        })
        .collect()
}

fn quick_successive_threads(set: &PatternSet) -> Vec<AnalysisThread> {
    let mut by_sender: Vec<(&str, Vec<&QuickSuccessive>)> = Vec::new();
    for entry in &set.quick_successive {
        match by_sender.iter_mut().find(|(s, _)| *s == entry.sender_id) {
            Some((_, group)) => group.push(entry),
            None => by_sender.push((entry.sender_id.as_str(), vec![entry])),
        }
    }

    by_sender
        .into_iter()
        .filter(|(_, group)| group.len() >= QUICK_MIN_ENTRIES)
        .take(QUICK_SENDERS_LISTED)
        .enumerate()
        .map(|(i, (_, group))| {
            let fastest = group
                .iter()
                .map(|q| q.time_diff_secs)
                .fold(f64::INFINITY, f64::min);
            let total: f64 = group.iter().map(|q| q.amount).sum();
            let scripted = fastest < QUICK_SCRIPTED_GAP_SECS;
            let mut evidence = vec![
                format!("{} transfers within 5 minutes of the previous one", group.len()),
                format!("Fastest gap: {fastest:.0} seconds"),
                format!("Total moved: ${total:.2}"),
            ];
            if scripted {
                evidence.push("Sub-10-second gaps suggest scripted activity".to_string());
            }
            let sender = group[0].sender_name.clone();

            AnalysisThread {
                thread_id: format!("fallback_quick_{i}"),
                description: format!(
                    "Rapid successive transfers by {sender} ({} quick transfers, ${total:.2})",
                    group.len()
                ),
                participants: unique_in_order(
                    std::iter::once(sender.as_str())
                        .chain(group.iter().map(|q| q.receiver_name.as_str())),
                ),
                risk_level: if scripted || group.len() >= QUICK_HIGH_ENTRIES {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                },
                evidence,
                transactions_involved: group.iter().map(|q| q.transaction_id.clone()).collect(),
                potential_violation: "Potential layering through rapid fund movement".to_string(),
                confidence_score: Some(0.6),
                recommended_action: Some(
                    "Review sender for automation and trace onward movement of funds".to_string(),
                ),
            }
        })
        .collect()
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Deterministic analysis of one pattern kind.
pub fn analyze(kind: PatternKind, set: &PatternSet) -> PatternAnalysis {
    let threads = match kind {
        PatternKind::FrequentPairs       => frequent_pair_threads(set),
        PatternKind::RoundAmounts        => round_amount_threads(set),
        PatternKind::HighActivityPeriods => high_activity_threads(set),
        PatternKind::RepeatedAmounts     => repeated_amount_threads(set),
        PatternKind::QuickSuccessive     => quick_successive_threads(set),
    };

    PatternAnalysis {
        risk_level: PatternAnalysis::risk_from_threads(&threads),
        summary: format!(
            "Fallback analysis for {kind}: {} suspicious patterns identified with rule-based risk assessment",
            threads.len()
        ),
        key_insights: Some(vec![
            format!("Analyzed {} records", set.count(kind)),
            format!("Identified {} suspicious patterns", threads.len()),
            "Used rule-based risk assessment criteria".to_string(),
        ]),
        threads,
        source: AnalysisSource::Fallback,
        error: None,
    }
}
