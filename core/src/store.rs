//! SQLite ledger access.
//!
//! RULE: Only store.rs talks to the database.
//! Loaders ask the store for a `RawTable`; they never execute SQL directly.

use crate::{
    error::DataLoadError,
    features::{RawRow, RawTable},
    timefmt,
    transaction::Transaction,
};
use rusqlite::{params, types::ValueRef, Connection, OpenFlags};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_TABLE: &str = "transactions";

pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    /// Open an existing ledger database for reading.
    pub fn open_read_only(path: &Path) -> Result<Self, DataLoadError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Open (or create) a ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, DataLoadError> {
        Ok(Self { conn: Connection::open(path)? })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> Result<Self, DataLoadError> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn migrate(&self) -> Result<(), DataLoadError> {
        self.conn.execute_batch(include_str!("../../migrations/001_ledger.sql"))?;
        Ok(())
    }

    // ── Writes ─────────────────────────────────────────────────

    pub fn insert_transactions(&self, txns: &[Transaction]) -> Result<usize, DataLoadError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (transaction_id, sender_id, sender_name, receiver_id,
                     receiver_name, amount, created_at, updated_at, remarks, reference, payment_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for t in txns {
                stmt.execute(params![
                    t.transaction_id,
                    t.sender_id,
                    t.sender_name,
                    t.receiver_id,
                    t.receiver_name,
                    t.amount,
                    timefmt::display(&t.created_at),
                    timefmt::display(&t.updated_at),
                    t.remarks,
                    t.reference,
                    t.payment_status,
                ])?;
            }
        }
        tx.commit()?;
        Ok(txns.len())
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Read every row of `table` as loosely typed JSON values.
    pub fn read_table(&self, table: &str) -> Result<RawTable, DataLoadError> {
        validate_table_name(table)?;
        let mut stmt = self.conn.prepare(&format!("SELECT * FROM \"{table}\""))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut map = RawRow::new();
                for (i, name) in columns.iter().enumerate() {
                    map.insert(name.clone(), json_value(row.get_ref(i)?));
                }
                Ok(map)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Read {} rows from table '{table}'", rows.len());
        Ok(RawTable { columns, rows })
    }
}

fn json_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<(), DataLoadError> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DataLoadError::NotATable(format!("invalid table name '{table}'")))
    }
}
