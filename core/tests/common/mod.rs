//! Shared builders and scripted model clients for integration tests.
#![allow(dead_code)]

use patternfinder_core::{
    config::{AnalyzerConfig, GenerationParams},
    features::{self, RawRow, RawTable},
    llm::{LlmClient, LlmError},
    loader::Dataset,
    transaction::DerivedTransaction,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One ledger row with every required column. `updated_at` is two minutes
/// after `created_at`.
pub fn row(id: &str, sender: &str, receiver: &str, amount: f64, created_at: &str) -> RawRow {
    let created = patternfinder_core::timefmt::parse_timestamp(created_at).expect("timestamp");
    let updated = created + chrono::Duration::seconds(120);
    let value = json!({
        "transaction_id": id,
        "sender_id": sender,
        "sender_name": format!("{sender} name"),
        "receiver_id": receiver,
        "receiver_name": format!("{receiver} name"),
        "amount": amount,
        "created_at": created_at,
        "updated_at": patternfinder_core::timefmt::display(&updated),
        "remarks": "Payment",
        "reference": format!("UTR-{id}"),
        "payment_status": "completed",
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// `count` transfers between one pair, `gap_secs` apart, starting at 10:00.
pub fn pair_rows(sender: &str, receiver: &str, amount: f64, count: usize, gap_secs: i64) -> Vec<RawRow> {
    let start = patternfinder_core::timefmt::parse_timestamp("2024-03-01 10:00:00").expect("start");
    (0..count)
        .map(|i| {
            let at = start + chrono::Duration::seconds(gap_secs * i as i64);
            row(
                &format!("{sender}-{receiver}-{i}"),
                sender,
                receiver,
                amount,
                &patternfinder_core::timefmt::display(&at),
            )
        })
        .collect()
}

pub fn derive(rows: Vec<RawRow>) -> Vec<DerivedTransaction> {
    features::derive_table(&RawTable::from_rows(rows)).expect("derive rows")
}

pub fn dataset(version: u64, rows: Vec<RawRow>) -> Dataset {
    Dataset::new(version, format!("test-v{version}"), derive(rows))
}

/// Ten 1,000.00 transfers from one sender to one receiver.
pub fn structuring_rows() -> Vec<RawRow> {
    pair_rows("S1", "R1", 1000.0, 10, 3_600)
}

pub fn test_config() -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default_test();
    config.llm.timeout_secs = 2;
    config
}

// ── Scripted model clients ───────────────────────────────────────────────────

/// Replies from a queue, then repeats `default` once the queue is empty.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    default: Result<String, LlmError>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String, LlmError>>, default: Result<String, LlmError>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            default,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::new(Vec::new(), Ok(reply.to_string()))
    }

    pub fn failing(err: LlmError) -> Self {
        Self::new(Vec::new(), Err(err))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl LlmClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Sleeps longer than any test timeout before answering.
pub struct SlowClient {
    pub delay: Duration,
}

impl LlmClient for SlowClient {
    fn name(&self) -> &str {
        "slow"
    }

    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        std::thread::sleep(self.delay);
        Ok("{\"threads\": [], \"risk_level\": \"low\", \"summary\": \"late\"}".to_string())
    }
}

pub fn thread_json(id: &str, risk: &str) -> String {
    format!(
        r#"{{"thread_id": "{id}", "description": "Pattern {id}", "participants": ["A", "B"],
            "risk_level": "{risk}", "evidence": ["e1"], "transactions_involved": ["t1"],
            "potential_violation": "Structuring", "confidence_score": 0.9}}"#
    )
}

pub fn analysis_json(risk: &str, threads: &[(&str, &str)]) -> String {
    let threads: Vec<String> = threads.iter().map(|(id, r)| thread_json(id, r)).collect();
    format!(
        r#"{{"threads": [{}], "risk_level": "{risk}", "summary": "Model summary", "key_insights": ["k1"]}}"#,
        threads.join(", ")
    )
}
