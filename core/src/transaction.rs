//! Ledger rows: the immutable transaction and its derived view.

use crate::types::{AccountId, TransactionId};
use chrono::{NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

pub const NO_REMARKS: &str = "No remarks";
pub const NO_REFERENCE: &str = "No reference";

/// One peer-to-peer transfer as loaded from the source. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub sender_id: AccountId,
    pub sender_name: String,
    pub receiver_id: AccountId,
    pub receiver_name: String,
    pub amount: f64,
    #[serde(with = "crate::timefmt")]
    pub created_at: NaiveDateTime,
    #[serde(with = "crate::timefmt")]
    pub updated_at: NaiveDateTime,
    pub remarks: String,
    pub reference: String,
    pub payment_status: String,
}

/// A transaction plus the columns computed for it on load.
///
/// The whole table is recomputed on every load; rows are never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedTransaction {
    #[serde(flatten)]
    pub txn: Transaction,
    pub hour: u32,
    pub day_of_week: Weekday,
    /// `updated_at - created_at` in seconds. Negative values are kept:
    /// they flag a data-quality problem upstream.
    pub processing_time: f64,
    pub is_large_amount: bool,
    pub is_quick_processing: bool,
    #[serde(with = "crate::timefmt")]
    pub hour_bucket: NaiveDateTime,
}

impl DerivedTransaction {
    pub fn id(&self) -> &str {
        &self.txn.transaction_id
    }

    pub fn amount(&self) -> f64 {
        self.txn.amount
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.txn.created_at
    }

    pub fn has_negative_processing_time(&self) -> bool {
        self.processing_time < 0.0
    }
}
