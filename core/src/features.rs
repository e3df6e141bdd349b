//! Feature derivation: raw ledger rows in, `DerivedTransaction` table out.
//!
//! Column names are resolved once against the table header, accepting the
//! legacy spellings found in exported ledgers (`user_id`, `reciever_id`,
//! `utr_number`). Every row is then parsed strictly: a missing or
//! unparsable required value fails the whole load.

use crate::{
    error::DataLoadError,
    stats,
    timefmt,
    transaction::{DerivedTransaction, Transaction, NO_REFERENCE, NO_REMARKS},
};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde_json::Value;

// ── Constants ────────────────────────────────────────────────────────────────

const LARGE_AMOUNT_QUANTILE: f64 = 0.95; // top 5% by amount
const QUICK_PROCESSING_SECS: f64 = 60.0;
const UNKNOWN_STATUS: &str = "unknown";

/// One raw row, keyed by source column name.
pub type RawRow = serde_json::Map<String, Value>;

/// A raw table as handed over by a dataset source.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table whose header is the union of row keys, in first-seen order.
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Column resolution ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    TransactionId,
    SenderId,
    SenderName,
    ReceiverId,
    ReceiverName,
    Amount,
    CreatedAt,
    UpdatedAt,
    Remarks,
    Reference,
    PaymentStatus,
}

impl Column {
    const ALL: [Column; 11] = [
        Column::TransactionId,
        Column::SenderId,
        Column::SenderName,
        Column::ReceiverId,
        Column::ReceiverName,
        Column::Amount,
        Column::CreatedAt,
        Column::UpdatedAt,
        Column::Remarks,
        Column::Reference,
        Column::PaymentStatus,
    ];

    fn canonical(self) -> &'static str {
        self.aliases()[0]
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::TransactionId => &["transaction_id", "id"],
            Column::SenderId      => &["sender_id", "user_id"],
            Column::SenderName    => &["sender_name", "user_name"],
            Column::ReceiverId    => &["receiver_id", "reciever_id"],
            Column::ReceiverName  => &["receiver_name", "reciever_name"],
            Column::Amount        => &["amount"],
            Column::CreatedAt     => &["created_at"],
            Column::UpdatedAt     => &["updated_at"],
            Column::Remarks       => &["remarks"],
            Column::Reference     => &["reference", "utr_number"],
            Column::PaymentStatus => &["payment_status"],
        }
    }
}

/// Source column name for each logical column, in `Column::ALL` order.
struct ColumnMap {
    names: Vec<String>,
}

impl ColumnMap {
    fn resolve(header: &[String]) -> Result<Self, DataLoadError> {
        let mut names = Vec::with_capacity(Column::ALL.len());
        for col in Column::ALL {
            let found = col.aliases().iter().find_map(|alias| {
                header
                    .iter()
                    .find(|h| h.trim().eq_ignore_ascii_case(alias))
                    .cloned()
            });
            match found {
                Some(name) => names.push(name),
                None => {
                    return Err(DataLoadError::MissingColumn {
                        column: col.canonical().to_string(),
                    })
                }
            }
        }
        Ok(Self { names })
    }

    fn get<'a>(&self, row: &'a RawRow, col: Column) -> Option<&'a Value> {
        let idx = Column::ALL.iter().position(|c| *c == col)?;
        match row.get(&self.names[idx]) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }
}

// ── Value parsing ────────────────────────────────────────────────────────────

fn invalid(row: usize, col: Column, reason: impl Into<String>) -> DataLoadError {
    DataLoadError::InvalidValue {
        row,
        column: col.canonical().to_string(),
        reason: reason.into(),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
                _ => n.to_string(),
            },
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(map: &ColumnMap, raw: &RawRow, row: usize, col: Column) -> Result<String, DataLoadError> {
    let value = map.get(raw, col).ok_or_else(|| invalid(row, col, "missing value"))?;
    match as_text(value) {
        Some(s) if !s.is_empty() => Ok(s),
        Some(_) => Err(invalid(row, col, "empty value")),
        None => Err(invalid(row, col, format!("expected text, got {value}"))),
    }
}

fn optional_text(map: &ColumnMap, raw: &RawRow, col: Column, sentinel: &str) -> String {
    map.get(raw, col)
        .and_then(as_text)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
        .unwrap_or_else(|| sentinel.to_string())
}

fn parse_amount(map: &ColumnMap, raw: &RawRow, row: usize) -> Result<f64, DataLoadError> {
    let col = Column::Amount;
    let value = map.get(raw, col).ok_or_else(|| invalid(row, col, "missing value"))?;
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    match amount {
        Some(a) if a.is_finite() => Ok(a),
        _ => Err(invalid(row, col, format!("not a number: {value}"))),
    }
}

fn parse_time(map: &ColumnMap, raw: &RawRow, row: usize, col: Column) -> Result<NaiveDateTime, DataLoadError> {
    let value = map.get(raw, col).ok_or_else(|| invalid(row, col, "missing value"))?;
    let parsed = match value {
        Value::String(s) => timefmt::parse_timestamp(s),
        // Integer epoch seconds.
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.naive_utc()),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(row, col, format!("unparsable timestamp: {value}")))
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Parse every row of `table` into a `Transaction`.
///
/// An empty table with no header is accepted and yields no rows.
pub fn parse_transactions(table: &RawTable) -> Result<Vec<Transaction>, DataLoadError> {
    if table.columns.is_empty() && table.rows.is_empty() {
        return Ok(Vec::new());
    }
    let map = ColumnMap::resolve(&table.columns)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            Ok(Transaction {
                transaction_id: required_text(&map, raw, row, Column::TransactionId)?,
                sender_id:      required_text(&map, raw, row, Column::SenderId)?,
                sender_name:    required_text(&map, raw, row, Column::SenderName)?,
                receiver_id:    required_text(&map, raw, row, Column::ReceiverId)?,
                receiver_name:  required_text(&map, raw, row, Column::ReceiverName)?,
                amount:         parse_amount(&map, raw, row)?,
                created_at:     parse_time(&map, raw, row, Column::CreatedAt)?,
                updated_at:     parse_time(&map, raw, row, Column::UpdatedAt)?,
                remarks:        optional_text(&map, raw, Column::Remarks, NO_REMARKS),
                reference:      optional_text(&map, raw, Column::Reference, NO_REFERENCE),
                payment_status: optional_text(&map, raw, Column::PaymentStatus, UNKNOWN_STATUS),
            })
        })
        .collect()
}

/// Compute the derived columns for a full set of transactions.
///
/// The large-amount threshold is the 95th percentile of this set, so the
/// whole table must be derived together.
pub fn derive_features(txns: Vec<Transaction>) -> Vec<DerivedTransaction> {
    let amounts: Vec<f64> = txns.iter().map(|t| t.amount).collect();
    let large_threshold = stats::quantile(&amounts, LARGE_AMOUNT_QUANTILE).unwrap_or(f64::INFINITY);

    let derived: Vec<DerivedTransaction> = txns
        .into_iter()
        .map(|txn| {
            let processing_time =
                (txn.updated_at - txn.created_at).num_milliseconds() as f64 / 1000.0;
            DerivedTransaction {
                hour: txn.created_at.hour(),
                day_of_week: txn.created_at.weekday(),
                processing_time,
                is_large_amount: txn.amount > large_threshold,
                is_quick_processing: processing_time < QUICK_PROCESSING_SECS,
                hour_bucket: timefmt::floor_to_hour(&txn.created_at),
                txn,
            }
        })
        .collect();

    let negative = derived.iter().filter(|d| d.has_negative_processing_time()).count();
    if negative > 0 {
        log::warn!("{negative} transactions have updated_at earlier than created_at");
    }
    log::info!(
        "Derived features for {} transactions (large-amount threshold {:.2})",
        derived.len(),
        large_threshold
    );
    derived
}

/// Parse and derive in one step.
pub fn derive_table(table: &RawTable) -> Result<Vec<DerivedTransaction>, DataLoadError> {
    Ok(derive_features(parse_transactions(table)?))
}
