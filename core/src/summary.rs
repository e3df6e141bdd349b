//! Dataset-level summary statistics. Pure; never fails.

use crate::transaction::DerivedTransaction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

const TOP_SENDERS: usize = 5;
const TOP_AMOUNTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "crate::timefmt")]
    pub start: NaiveDateTime,
    #[serde(with = "crate::timefmt")]
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount<T> {
    pub value: T,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_transactions: usize,
    pub unique_senders: usize,
    pub unique_receivers: usize,
    pub total_amount: f64,
    pub average_amount: f64,
    /// `None` for an empty dataset.
    pub date_range: Option<DateRange>,
    pub payment_statuses: Vec<ValueCount<String>>,
    pub top_senders_by_count: Vec<ValueCount<String>>,
    pub top_amounts: Vec<ValueCount<f64>>,
}

/// Count occurrences, most common first. Ties keep first-seen order.
fn value_counts<T, K: std::hash::Hash + Eq>(
    items: impl Iterator<Item = (K, T)>,
) -> Vec<ValueCount<T>> {
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<ValueCount<T>> = Vec::new();
    for (key, value) in items {
        let slot = *index.entry(key).or_insert_with(|| {
            counts.push(ValueCount { value, count: 0 });
            counts.len() - 1
        });
        counts[slot].count += 1;
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn build_summary(rows: &[DerivedTransaction]) -> SummaryStats {
    if rows.is_empty() {
        return SummaryStats::default();
    }

    let total_amount: f64 = rows.iter().map(|r| r.txn.amount).sum();
    let date_range = rows
        .iter()
        .map(|r| r.txn.created_at)
        .min()
        .zip(rows.iter().map(|r| r.txn.created_at).max())
        .map(|(start, end)| DateRange { start, end });

    let mut top_senders = value_counts(
        rows.iter().map(|r| (r.txn.sender_name.as_str(), r.txn.sender_name.clone())),
    );
    top_senders.truncate(TOP_SENDERS);

    let mut top_amounts = value_counts(rows.iter().map(|r| {
        let amount = if r.txn.amount == 0.0 { 0.0 } else { r.txn.amount };
        (amount.to_bits(), amount)
    }));
    top_amounts.truncate(TOP_AMOUNTS);

    SummaryStats {
        total_transactions: rows.len(),
        unique_senders: rows.iter().map(|r| r.txn.sender_id.as_str()).collect::<BTreeSet<_>>().len(),
        unique_receivers: rows.iter().map(|r| r.txn.receiver_id.as_str()).collect::<BTreeSet<_>>().len(),
        total_amount,
        average_amount: total_amount / rows.len() as f64,
        date_range,
        payment_statuses: value_counts(
            rows.iter().map(|r| (r.txn.payment_status.as_str(), r.txn.payment_status.clone())),
        ),
        top_senders_by_count: top_senders,
        top_amounts,
    }
}
