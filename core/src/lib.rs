//! Transaction pattern detection and AI-assisted AML analysis.
//!
//! Pipeline: `loader` → `features` → `patterns` / `summary` → `orchestrator`
//! (prompt → llm → parser, or `fallback`) → `cache`. `service` exposes the
//! served operations over one active dataset.

pub mod analysis;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod features;
pub mod llm;
pub mod loader;
pub mod orchestrator;
pub mod outcome;
pub mod parser;
pub mod patterns;
pub mod prompt;
pub mod service;
pub mod stats;
pub mod store;
pub mod summary;
pub mod synth;
pub mod timefmt;
pub mod transaction;
pub mod types;
