//! Analysis result schema: threads, per-kind analyses, overall verdict.

use crate::{
    patterns::PatternKind,
    types::{DatasetVersion, RunId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const TOP_THREATS: usize = 5;

/// Ordered by severity: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low    => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High   => "high",
        }
    }

    /// Accepts the spellings models actually produce ("High", "HIGH RISK",
    /// "critical"). Text naming more than one level ("high | medium | low")
    /// is ambiguous and, like anything unrecognised, is `None`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        let mut found = None;
        for word in lower.split(|c: char| !c.is_ascii_alphabetic()) {
            let level = match word {
                "high" | "critical" | "severe" => RiskLevel::High,
                "medium" | "moderate" | "elevated" => RiskLevel::Medium,
                "low" | "minimal" | "none" => RiskLevel::Low,
                _ => continue,
            };
            match found {
                Some(prev) if prev != level => return None,
                _ => found = Some(level),
            }
        }
        found
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One suspicious pattern instance with its evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisThread {
    pub thread_id: String,
    pub description: String,
    pub participants: Vec<String>,
    pub risk_level: RiskLevel,
    pub evidence: Vec<String>,
    pub transactions_involved: Vec<String>,
    pub potential_violation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

/// Where a `PatternAnalysis` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Structured JSON returned by the model.
    Model,
    /// Model replied, but only free text could be salvaged.
    ModelText,
    /// Deterministic rules; the model was absent or failed.
    Fallback,
    /// Nothing was detected for this kind, so nothing was asked.
    NoRecords,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub threads: Vec<AnalysisThread>,
    pub risk_level: RiskLevel,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_insights: Option<Vec<String>>,
    pub source: AnalysisSource,
    /// Set when this analysis is a degraded substitute for a failed model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatternAnalysis {
    /// `high` if any thread is high, `medium` if there are any threads, else `low`.
    pub fn risk_from_threads(threads: &[AnalysisThread]) -> RiskLevel {
        if threads.iter().any(|t| t.risk_level == RiskLevel::High) {
            RiskLevel::High
        } else if threads.is_empty() {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }

    /// The analysis of a kind with no detected records.
    pub fn no_records(kind: PatternKind) -> Self {
        Self {
            threads: Vec::new(),
            risk_level: RiskLevel::Low,
            summary: format!("No {kind} records detected"),
            key_insights: None,
            source: AnalysisSource::NoRecords,
            error: None,
        }
    }

    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindAnalysis {
    pub pattern_type: PatternKind,
    #[serde(flatten)]
    pub analysis: PatternAnalysis,
}

/// A thread labelled with the pattern kind that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedThread {
    pub pattern_type: PatternKind,
    #[serde(flatten)]
    pub thread: AnalysisThread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub thread_count: usize,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub total_threads: usize,
    pub overall_risk_level: RiskLevel,
    pub executive_summary: String,
    pub pattern_summary: BTreeMap<PatternKind, PatternSummary>,
    pub top_threats: Vec<TaggedThread>,
}

/// A step that fell back to a degraded result, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub step: String,
    pub reason: String,
}

/// Everything one analysis run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: RunId,
    pub dataset_version: DatasetVersion,
    pub computed_at: DateTime<Utc>,
    pub analyses: Vec<KindAnalysis>,
    pub overall_assessment: OverallAssessment,
    pub degradations: Vec<Degradation>,
}

impl AnalysisReport {
    pub fn analysis(&self, kind: PatternKind) -> Option<&PatternAnalysis> {
        self.analyses
            .iter()
            .find(|a| a.pattern_type == kind)
            .map(|a| &a.analysis)
    }

    /// All threads across kinds, in analysis order.
    pub fn all_threads(&self) -> Vec<TaggedThread> {
        self.analyses
            .iter()
            .flat_map(|ka| {
                ka.analysis.threads.iter().map(move |t| TaggedThread {
                    pattern_type: ka.pattern_type,
                    thread: t.clone(),
                })
            })
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

// ── Aggregation rules ────────────────────────────────────────────────────────

/// `high` if two or more kinds are high; `medium` if one is high or three or
/// more are medium; otherwise `low`.
pub fn overall_risk(levels: &[RiskLevel]) -> RiskLevel {
    let high = levels.iter().filter(|l| **l == RiskLevel::High).count();
    let medium = levels.iter().filter(|l| **l == RiskLevel::Medium).count();
    if high >= 2 {
        RiskLevel::High
    } else if high >= 1 || medium >= 3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Sort by severity, most severe first, keeping input order on ties.
pub fn rank_by_severity(mut threads: Vec<TaggedThread>) -> Vec<TaggedThread> {
    threads.sort_by(|a, b| b.thread.risk_level.cmp(&a.thread.risk_level));
    threads
}

pub fn top_threats(threads: Vec<TaggedThread>) -> Vec<TaggedThread> {
    let mut ranked = rank_by_severity(threads);
    ranked.truncate(TOP_THREATS);
    ranked
}
