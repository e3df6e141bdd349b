//! Shared primitive types used across the whole pipeline.

/// A transaction identifier as it appears in the source ledger.
/// Integer ids are stringified on load.
pub type TransactionId = String;

/// A sender or receiver account identifier.
pub type AccountId = String;

/// Monotonic dataset version. Bumped on every successful load.
pub type DatasetVersion = u64;

/// The identifier of one completed analysis run.
pub type RunId = uuid::Uuid;
