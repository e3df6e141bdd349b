use thiserror::Error;

/// Malformed or missing source data. Always fatal for the load that hit it.
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Row {row}: column '{column}' is invalid: {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("Unsupported dataset format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Dataset is not a table of rows: {0}")]
    NotATable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Everything the service facade can surface to a caller.
///
/// LLM failures and response-parse failures never appear here: they are
/// absorbed per pattern type by the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data load failed: {0}")]
    DataLoad(#[from] DataLoadError),

    #[error("No dataset loaded")]
    NoDataset,

    #[error("No analysis available. Run analyze first.")]
    NoAnalysis,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
