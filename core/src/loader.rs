//! Dataset sources and the immutable loaded dataset.

use crate::{
    error::DataLoadError,
    features::{self, RawRow, RawTable},
    patterns::{self, PatternSet},
    store::{LedgerStore, DEFAULT_TABLE},
    summary::{self, SummaryStats},
    transaction::DerivedTransaction,
    types::DatasetVersion,
};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetSource {
    /// A JSON array of row objects, an object with a `transactions` array,
    /// or (for `.jsonl`) one object per line.
    JsonFile(PathBuf),
    /// A headed CSV export. Cells are kept as text; empty cells read as missing.
    CsvFile(PathBuf),
    Sqlite { path: PathBuf, table: String },
    /// Rows already in memory.
    Rows { label: String, rows: Vec<RawRow> },
}

impl DatasetSource {
    /// Pick a source kind from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataLoadError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" | "jsonl" => Ok(DatasetSource::JsonFile(path.to_path_buf())),
            "csv" => Ok(DatasetSource::CsvFile(path.to_path_buf())),
            "db" | "sqlite" | "sqlite3" => Ok(DatasetSource::Sqlite {
                path: path.to_path_buf(),
                table: DEFAULT_TABLE.to_string(),
            }),
            _ => Err(DataLoadError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn label(&self) -> String {
        match self {
            DatasetSource::JsonFile(path) | DatasetSource::CsvFile(path) => {
                path.display().to_string()
            }
            DatasetSource::Sqlite { path, table } => format!("{}#{table}", path.display()),
            DatasetSource::Rows { label, .. } => label.clone(),
        }
    }

    fn read_table(&self) -> Result<RawTable, DataLoadError> {
        match self {
            DatasetSource::JsonFile(path) => read_json_file(path),
            DatasetSource::CsvFile(path) => read_csv_file(path),
            DatasetSource::Sqlite { path, table } => {
                LedgerStore::open_read_only(path)?.read_table(table)
            }
            DatasetSource::Rows { rows, .. } => Ok(RawTable::from_rows(rows.clone())),
        }
    }
}

/// A loaded, fully derived transaction table. Immutable once built.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub version: DatasetVersion,
    pub label: String,
    rows: Arc<Vec<DerivedTransaction>>,
}

impl Dataset {
    pub fn new(version: DatasetVersion, label: impl Into<String>, rows: Vec<DerivedTransaction>) -> Self {
        Self {
            version,
            label: label.into(),
            rows: Arc::new(rows),
        }
    }

    pub fn rows(&self) -> &[DerivedTransaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> SummaryStats {
        summary::build_summary(&self.rows)
    }

    pub fn patterns(&self) -> PatternSet {
        patterns::detect_all(&self.rows)
    }
}

/// Read, parse and derive `source` into a dataset stamped with `version`.
pub fn load(source: &DatasetSource, version: DatasetVersion) -> Result<Dataset, DataLoadError> {
    let label = source.label();
    let table = source.read_table()?;
    let rows = features::derive_table(&table)?;
    log::info!("Loaded {} transactions from {label}", rows.len());
    Ok(Dataset::new(version, label, rows))
}

fn read_json_file(path: &Path) -> Result<RawTable, DataLoadError> {
    let text = fs::read_to_string(path)?;
    let is_lines = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    let values: Vec<Value> = if is_lines {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str::<Value>)
            .collect::<Result<_, _>>()?
    } else {
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("transactions") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(DataLoadError::NotATable(
                        "expected an array or an object with a 'transactions' array".into(),
                    ))
                }
            },
            other => {
                return Err(DataLoadError::NotATable(format!("unexpected top-level value: {other}")))
            }
        }
    };

    let rows = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Object(map) => Ok(map),
            other => Err(DataLoadError::NotATable(format!("row {i} is not an object: {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawTable::from_rows(rows))
}

fn read_csv_file(path: &Path) -> Result<RawTable, DataLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRow = columns
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (name.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(RawTable { columns, rows })
}
