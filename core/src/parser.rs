//! Best-effort parsing of model output into a `PatternAnalysis`.
//!
//! The model is asked for a single JSON object but may wrap it in prose or
//! code fences, drop fields, or answer in free text. Parsing therefore has
//! two layers:
//!   1. `parse_structured`: locate the first top-level `{...}` object and
//!      read the schema leniently, back-filling missing fields.
//!   2. `reconstruct_from_text`: keyword heuristics over the raw text.
//! `parse_response` tries 1, falls back to 2, and never fails.

use crate::{
    analysis::{AnalysisSource, AnalysisThread, PatternAnalysis, RiskLevel},
    patterns::PatternKind,
};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_SUMMARY: &str = "Analysis completed";
pub const SUSPICIOUS_KEYWORDS: &[&str] =
    &["suspicious", "unusual", "potential", "risk", "anomaly", "pattern"];

const HIGH_PHRASES: &[&str] = &["high risk", "highly suspicious"];
const LOW_PHRASES: &[&str] = &["low risk", "minimal risk"];
const SUMMARY_EXCERPT_CHARS: usize = 200;
const EVIDENCE_EXCERPT_CHARS: usize = 100;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("No JSON object found in response")]
    NoJsonObject,

    #[error("JSON parsing failed: {0}")]
    Json(String),

    #[error("Top-level JSON value is not an object")]
    NotAnObject,
}

/// Return the first top-level brace-delimited object in `text`.
///
/// Braces inside JSON strings are ignored. If the object never closes, the
/// span up to the last `}` is returned so the JSON parser can report why.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > max_chars {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A list of strings, tolerating a bare scalar in place of a list.
fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_text).collect(),
        Some(other) => value_as_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn risk_field(obj: &Map<String, Value>) -> RiskLevel {
    obj.get("risk_level")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse_lenient)
        .unwrap_or_default()
}

fn confidence_field(obj: &Map<String, Value>) -> Option<f64> {
    let raw = match obj.get("confidence_score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

fn thread_from_value(kind: PatternKind, index: usize, value: &Value) -> Option<AnalysisThread> {
    let obj = value.as_object()?;
    let text = |key: &str| obj.get(key).and_then(value_as_text);

    Some(AnalysisThread {
        thread_id: text("thread_id").unwrap_or_else(|| format!("{kind}_{}", index + 1)),
        description: text("description")
            .unwrap_or_else(|| "Potential suspicious activity identified".to_string()),
        participants: dedup_preserving_order(text_list(obj.get("participants"))),
        risk_level: risk_field(obj),
        evidence: text_list(obj.get("evidence")),
        transactions_involved: text_list(obj.get("transactions_involved")),
        potential_violation: text("potential_violation").unwrap_or_else(|| "Unknown".to_string()),
        confidence_score: confidence_field(obj),
        recommended_action: text("recommended_action"),
    })
}

/// Parse the first JSON object in `text` as an analysis.
///
/// Missing `threads`, `risk_level` and `summary` are back-filled with
/// `[]`, `medium` and "Analysis completed". Malformed threads are skipped.
pub fn parse_structured(text: &str, kind: PatternKind) -> Result<PatternAnalysis, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;
    let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

    let threads: Vec<AnalysisThread> = match obj.get("threads") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| thread_from_value(kind, i, v))
            .collect(),
        _ => Vec::new(),
    };

    let key_insights = match obj.get("key_insights") {
        None | Some(Value::Null) => None,
        some => Some(text_list(some)),
    };

    Ok(PatternAnalysis {
        threads,
        risk_level: risk_field(obj),
        summary: obj
            .get("summary")
            .and_then(value_as_text)
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        key_insights,
        source: AnalysisSource::Model,
        error: None,
    })
}

/// Infer an overall risk level from phrases in free text.
pub fn risk_from_text(text: &str) -> RiskLevel {
    let lower = text.to_lowercase();
    if HIGH_PHRASES.iter().any(|p| lower.contains(p)) {
        RiskLevel::High
    } else if LOW_PHRASES.iter().any(|p| lower.contains(p)) {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

/// Heuristic reconstruction from free text. Any suspicious keyword yields
/// one generic medium-risk thread quoting the start of the text.
pub fn reconstruct_from_text(text: &str, kind: PatternKind) -> PatternAnalysis {
    let lower = text.to_lowercase();
    let mut threads = Vec::new();
    if SUSPICIOUS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        threads.push(AnalysisThread {
            thread_id: format!("{kind}_text_1"),
            description: "Potential suspicious activity identified".to_string(),
            participants: Vec::new(),
            risk_level: RiskLevel::Medium,
            evidence: vec![excerpt(text, EVIDENCE_EXCERPT_CHARS)],
            transactions_involved: Vec::new(),
            potential_violation: "Unknown".to_string(),
            confidence_score: None,
            recommended_action: None,
        });
    }

    let summary = excerpt(text, SUMMARY_EXCERPT_CHARS);
    PatternAnalysis {
        threads,
        risk_level: risk_from_text(text),
        summary: if summary.is_empty() {
            "No analysis text returned".to_string()
        } else {
            summary
        },
        key_insights: None,
        source: AnalysisSource::ModelText,
        error: None,
    }
}

/// Parse any model output. Never fails.
pub fn parse_response(text: &str, kind: PatternKind) -> PatternAnalysis {
    match parse_structured(text, kind) {
        Ok(analysis) => analysis,
        Err(e) => {
            log::warn!("Could not parse JSON from model response for {kind}: {e}");
            reconstruct_from_text(text, kind)
        }
    }
}
