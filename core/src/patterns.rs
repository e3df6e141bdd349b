//! Pattern detection over one `DerivedTransaction` snapshot.
//!
//! Five independent extractors:
//!   - Frequent pairs        (same sender → receiver, 3+ times)
//!   - Round amounts         (amount is a multiple of 1,000)
//!   - High activity periods (hourly buckets above the 90th percentile)
//!   - Repeated amounts      (exact amount seen 3+ times)
//!   - Quick successive      (same sender again within 5 minutes)
//!
//! RULE: extractors are pure. They borrow the snapshot read-only and return
//! owned records, so every aggregate in a `PatternSet` comes from the same
//! snapshot.

use crate::{
    stats,
    transaction::DerivedTransaction,
    types::{AccountId, TransactionId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ── Constants ────────────────────────────────────────────────────────────────

const FREQUENT_PAIR_MIN_COUNT: usize = 3;
const FREQUENT_PAIR_SAMPLES: usize = 3;
const ROUND_AMOUNT_UNIT: f64 = 1000.0;
const HIGH_ACTIVITY_QUANTILE: f64 = 0.9;
const HIGH_ACTIVITY_SAMPLES: usize = 5;
const REPEATED_AMOUNT_MIN_COUNT: usize = 3;
const REPEATED_AMOUNT_SAMPLES: usize = 3;
const QUICK_SUCCESSIVE_WINDOW_SECS: f64 = 300.0; // 5 minutes

// ── Pattern kinds ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    FrequentPairs,
    RoundAmounts,
    HighActivityPeriods,
    RepeatedAmounts,
    QuickSuccessive,
}

impl PatternKind {
    /// Analysis order: priority kinds first, then the rest.
    pub const ALL: [PatternKind; 5] = [
        PatternKind::FrequentPairs,
        PatternKind::RoundAmounts,
        PatternKind::HighActivityPeriods,
        PatternKind::RepeatedAmounts,
        PatternKind::QuickSuccessive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::FrequentPairs       => "frequent_pairs",
            PatternKind::RoundAmounts        => "round_amounts",
            PatternKind::HighActivityPeriods => "high_activity_periods",
            PatternKind::RepeatedAmounts     => "repeated_amounts",
            PatternKind::QuickSuccessive     => "quick_successive",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PatternKind::FrequentPairs       => "Frequent User Pairs",
            PatternKind::RoundAmounts        => "Round Amount Transactions",
            PatternKind::HighActivityPeriods => "High Activity Periods",
            PatternKind::RepeatedAmounts     => "Repeated Amount Patterns",
            PatternKind::QuickSuccessive     => "Quick Successive Transactions",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A source transaction quoted as evidence inside a pattern record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTransaction {
    pub transaction_id: TransactionId,
    pub sender_name: String,
    pub receiver_name: String,
    pub amount: f64,
    #[serde(with = "crate::timefmt")]
    pub created_at: NaiveDateTime,
    pub remarks: String,
}

impl SampleTransaction {
    fn of(row: &DerivedTransaction) -> Self {
        Self {
            transaction_id: row.txn.transaction_id.clone(),
            sender_name: row.txn.sender_name.clone(),
            receiver_name: row.txn.receiver_name.clone(),
            amount: row.txn.amount,
            created_at: row.txn.created_at,
            remarks: row.txn.remarks.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentPair {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub sender_name: String,
    pub receiver_name: String,
    pub transaction_count: usize,
    pub total_amount: f64,
    pub average_amount: f64,
    /// `None` when the group has too few rows to measure spread.
    pub amount_std: Option<f64>,
    #[serde(with = "crate::timefmt")]
    pub first_transaction: NaiveDateTime,
    #[serde(with = "crate::timefmt")]
    pub last_transaction: NaiveDateTime,
    pub sample_transactions: Vec<SampleTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundAmount {
    pub transaction_id: TransactionId,
    pub sender_id: AccountId,
    pub sender_name: String,
    pub receiver_name: String,
    pub amount: f64,
    #[serde(with = "crate::timefmt")]
    pub created_at: NaiveDateTime,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighActivityPeriod {
    #[serde(with = "crate::timefmt")]
    pub time_period: NaiveDateTime,
    pub transaction_count: usize,
    pub unique_senders: usize,
    pub total_amount: f64,
    pub sample_transactions: Vec<SampleTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedAmount {
    pub amount: f64,
    pub frequency: usize,
    pub unique_senders: usize,
    pub unique_receivers: usize,
    pub sample_transactions: Vec<SampleTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickSuccessive {
    pub transaction_id: TransactionId,
    /// The same sender's immediately preceding transaction.
    pub previous_transaction_id: TransactionId,
    pub sender_id: AccountId,
    pub sender_name: String,
    pub receiver_name: String,
    pub amount: f64,
    pub time_diff_secs: f64,
    #[serde(with = "crate::timefmt")]
    pub created_at: NaiveDateTime,
}

/// One record of any kind. Serialized without a tag: the kind is always
/// known from context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatternRecord {
    FrequentPair(FrequentPair),
    RoundAmount(RoundAmount),
    HighActivityPeriod(HighActivityPeriod),
    RepeatedAmount(RepeatedAmount),
    QuickSuccessive(QuickSuccessive),
}

impl PatternRecord {
    pub fn kind(&self) -> PatternKind {
        match self {
            PatternRecord::FrequentPair(_)       => PatternKind::FrequentPairs,
            PatternRecord::RoundAmount(_)        => PatternKind::RoundAmounts,
            PatternRecord::HighActivityPeriod(_) => PatternKind::HighActivityPeriods,
            PatternRecord::RepeatedAmount(_)     => PatternKind::RepeatedAmounts,
            PatternRecord::QuickSuccessive(_)    => PatternKind::QuickSuccessive,
        }
    }
}

/// Output of all five extractors over one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternSet {
    pub frequent_pairs: Vec<FrequentPair>,
    pub round_amounts: Vec<RoundAmount>,
    pub high_activity_periods: Vec<HighActivityPeriod>,
    pub repeated_amounts: Vec<RepeatedAmount>,
    pub quick_successive: Vec<QuickSuccessive>,
}

impl PatternSet {
    pub fn count(&self, kind: PatternKind) -> usize {
        match kind {
            PatternKind::FrequentPairs       => self.frequent_pairs.len(),
            PatternKind::RoundAmounts        => self.round_amounts.len(),
            PatternKind::HighActivityPeriods => self.high_activity_periods.len(),
            PatternKind::RepeatedAmounts     => self.repeated_amounts.len(),
            PatternKind::QuickSuccessive     => self.quick_successive.len(),
        }
    }

    /// The first `limit` records of `kind`, in detector order.
    pub fn records(&self, kind: PatternKind, limit: usize) -> Vec<PatternRecord> {
        match kind {
            PatternKind::FrequentPairs => self.frequent_pairs.iter().take(limit)
                .cloned().map(PatternRecord::FrequentPair).collect(),
            PatternKind::RoundAmounts => self.round_amounts.iter().take(limit)
                .cloned().map(PatternRecord::RoundAmount).collect(),
            PatternKind::HighActivityPeriods => self.high_activity_periods.iter().take(limit)
                .cloned().map(PatternRecord::HighActivityPeriod).collect(),
            PatternKind::RepeatedAmounts => self.repeated_amounts.iter().take(limit)
                .cloned().map(PatternRecord::RepeatedAmount).collect(),
            PatternKind::QuickSuccessive => self.quick_successive.iter().take(limit)
                .cloned().map(PatternRecord::QuickSuccessive).collect(),
        }
    }

    /// Kinds with at least one record, in analysis order.
    pub fn non_empty_kinds(&self) -> Vec<PatternKind> {
        PatternKind::ALL
            .into_iter()
            .filter(|k| self.count(*k) > 0)
            .collect()
    }
}

// ── Extractors ───────────────────────────────────────────────────────────────

/// Run all five extractors over the same snapshot.
pub fn detect_all(rows: &[DerivedTransaction]) -> PatternSet {
    let set = PatternSet {
        frequent_pairs: frequent_pairs(rows),
        round_amounts: round_amounts(rows),
        high_activity_periods: high_activity_periods(rows),
        repeated_amounts: repeated_amounts(rows),
        quick_successive: quick_successive(rows),
    };
    log::info!(
        "Detected patterns: {} frequent pairs, {} round amounts, {} high-activity periods, \
         {} repeated amounts, {} quick successive",
        set.frequent_pairs.len(),
        set.round_amounts.len(),
        set.high_activity_periods.len(),
        set.repeated_amounts.len(),
        set.quick_successive.len(),
    );
    set
}

/// Sender → receiver pairs seen at least three times, most frequent first.
pub fn frequent_pairs(rows: &[DerivedTransaction]) -> Vec<FrequentPair> {
    let mut groups: BTreeMap<(&str, &str), Vec<&DerivedTransaction>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.txn.sender_id.as_str(), row.txn.receiver_id.as_str()))
            .or_default()
            .push(row);
    }

    let mut pairs: Vec<FrequentPair> = groups
        .into_iter()
        .filter(|(_, group)| group.len() >= FREQUENT_PAIR_MIN_COUNT)
        .filter_map(|((sender_id, receiver_id), group)| {
            let first = group.first()?;
            let amounts: Vec<f64> = group.iter().map(|r| r.txn.amount).collect();
            let total: f64 = amounts.iter().sum();
            Some(FrequentPair {
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                sender_name: first.txn.sender_name.clone(),
                receiver_name: first.txn.receiver_name.clone(),
                transaction_count: group.len(),
                total_amount: stats::round2(total),
                average_amount: stats::round2(total / group.len() as f64),
                amount_std: stats::sample_std_dev(&amounts).map(stats::round2),
                first_transaction: group.iter().map(|r| r.txn.created_at).min()?,
                last_transaction: group.iter().map(|r| r.txn.created_at).max()?,
                sample_transactions: group
                    .iter()
                    .take(FREQUENT_PAIR_SAMPLES)
                    .map(|r| SampleTransaction::of(r))
                    .collect(),
            })
        })
        .collect();

    // Stable: equal counts keep (sender, receiver) order.
    pairs.sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));
    pairs
}

pub fn is_round_amount(amount: f64) -> bool {
    amount % ROUND_AMOUNT_UNIT == 0.0
}

/// Every transaction whose amount is a whole multiple of 1,000, in ledger order.
pub fn round_amounts(rows: &[DerivedTransaction]) -> Vec<RoundAmount> {
    rows.iter()
        .filter(|r| is_round_amount(r.txn.amount))
        .map(|r| RoundAmount {
            transaction_id: r.txn.transaction_id.clone(),
            sender_id: r.txn.sender_id.clone(),
            sender_name: r.txn.sender_name.clone(),
            receiver_name: r.txn.receiver_name.clone(),
            amount: r.txn.amount,
            created_at: r.txn.created_at,
            remarks: r.txn.remarks.clone(),
        })
        .collect()
}

/// Hourly buckets whose count exceeds the 90th percentile of all hourly counts.
pub fn high_activity_periods(rows: &[DerivedTransaction]) -> Vec<HighActivityPeriod> {
    let mut buckets: BTreeMap<NaiveDateTime, Vec<&DerivedTransaction>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.hour_bucket).or_default().push(row);
    }

    let counts: Vec<f64> = buckets.values().map(|b| b.len() as f64).collect();
    let Some(threshold) = stats::quantile(&counts, HIGH_ACTIVITY_QUANTILE) else {
        return Vec::new();
    };

    let mut periods: Vec<HighActivityPeriod> = buckets
        .into_iter()
        .filter(|(_, bucket)| bucket.len() as f64 > threshold)
        .map(|(hour, bucket)| HighActivityPeriod {
            time_period: hour,
            transaction_count: bucket.len(),
            unique_senders: bucket
                .iter()
                .map(|r| r.txn.sender_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            total_amount: stats::round2(bucket.iter().map(|r| r.txn.amount).sum()),
            sample_transactions: bucket
                .iter()
                .take(HIGH_ACTIVITY_SAMPLES)
                .map(|r| SampleTransaction::of(r))
                .collect(),
        })
        .collect();

    periods.sort_by(|a, b| b.transaction_count.cmp(&a.transaction_count));
    periods
}

/// Exact amounts that occur at least three times, most frequent first.
pub fn repeated_amounts(rows: &[DerivedTransaction]) -> Vec<RepeatedAmount> {
    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut groups: Vec<(f64, Vec<&DerivedTransaction>)> = Vec::new();
    for row in rows {
        // -0.0 and 0.0 are the same amount.
        let amount = if row.txn.amount == 0.0 { 0.0 } else { row.txn.amount };
        let slot = *index.entry(amount.to_bits()).or_insert_with(|| {
            groups.push((amount, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row);
    }

    groups.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut repeated: Vec<RepeatedAmount> = groups
        .into_iter()
        .filter(|(_, group)| group.len() >= REPEATED_AMOUNT_MIN_COUNT)
        .map(|(amount, group)| RepeatedAmount {
            amount,
            frequency: group.len(),
            unique_senders: group
                .iter()
                .map(|r| r.txn.sender_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            unique_receivers: group
                .iter()
                .map(|r| r.txn.receiver_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            sample_transactions: group
                .iter()
                .take(REPEATED_AMOUNT_SAMPLES)
                .map(|r| SampleTransaction::of(r))
                .collect(),
        })
        .collect();

    repeated.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    repeated
}

/// Transactions that follow the same sender's previous one within five minutes.
///
/// A sender's first transaction has no predecessor and never appears here.
pub fn quick_successive(rows: &[DerivedTransaction]) -> Vec<QuickSuccessive> {
    let mut ordered: Vec<&DerivedTransaction> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        a.txn
            .sender_id
            .cmp(&b.txn.sender_id)
            .then(a.txn.created_at.cmp(&b.txn.created_at))
    });

    ordered
        .windows(2)
        .filter(|w| w[0].txn.sender_id == w[1].txn.sender_id)
        .filter_map(|w| {
            let (prev, cur) = (w[0], w[1]);
            let delta = (cur.txn.created_at - prev.txn.created_at).num_milliseconds() as f64 / 1000.0;
            (delta <= QUICK_SUCCESSIVE_WINDOW_SECS).then(|| QuickSuccessive {
                transaction_id: cur.txn.transaction_id.clone(),
                previous_transaction_id: prev.txn.transaction_id.clone(),
                sender_id: cur.txn.sender_id.clone(),
                sender_name: cur.txn.sender_name.clone(),
                receiver_name: cur.txn.receiver_name.clone(),
                amount: cur.txn.amount,
                time_diff_secs: delta,
                created_at: cur.txn.created_at,
            })
        })
        .collect()
}
