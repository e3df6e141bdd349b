//! Analysis prompts. One request per pattern kind, built from a capped slice
//! of that kind's records plus the dataset summary.
//!
//! Prompt text is a pure function of its inputs: the same records and
//! summary always yield byte-identical text.

use crate::{
    analysis::{RiskLevel, TaggedThread},
    config::{GenerationParams, PromptConfig},
    patterns::{PatternKind, PatternSet},
    summary::SummaryStats,
    timefmt,
};

pub const ANALYST_FRAMING: &str = r#"
You are a financial crime analyst specialising in anti-money-laundering (AML)
review of peer-to-peer payment ledgers.

ANALYSIS FOCUS:
- Structuring: splitting funds to stay below reporting thresholds (e.g. $10,000).
- Layering: rapid movement of funds through several accounts to obscure origin.
- Timing anomalies: bursts, off-hours activity, machine-like regularity.
- Cite concrete evidence (counts, amounts, timestamps, transaction ids) for
  every finding and rate each finding high, medium or low risk.
- Report only what the records support. Do not invent participants or ids.
"#;

pub const OUTPUT_SCHEMA: &str = r#"{
  "threads": [
    {
      "thread_id": "unique identifier for this finding",
      "description": "what is suspicious, with specific evidence",
      "participants": ["name 1", "name 2"],
      "risk_level": "high | medium | low",
      "evidence": ["evidence point with numbers", "evidence point with timing"],
      "transactions_involved": ["transaction ids"],
      "potential_violation": "e.g. structuring to avoid reporting requirements",
      "confidence_score": 0.0,
      "recommended_action": "specific next step"
    }
  ],
  "risk_level": "high | medium | low",
  "summary": "summary of findings with key statistics",
  "key_insights": ["insight 1", "insight 2"]
}"#;

/// Everything needed to make one model call for one pattern kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub pattern_type: PatternKind,
    pub prompt: String,
    pub params: GenerationParams,
    /// Records embedded in the prompt, at most the kind's cap.
    pub record_count: usize,
    pub total_records: usize,
}

pub fn record_cap(kind: PatternKind, config: &PromptConfig) -> usize {
    match kind {
        PatternKind::FrequentPairs | PatternKind::RoundAmounts => config.primary_record_cap,
        _ => config.secondary_record_cap,
    }
}

fn focus_points(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::FrequentPairs => "\
1. Unusually high transaction counts between the same two users.
2. Amounts just under reporting thresholds, or suspiciously uniform amounts.
3. Rapid back-and-forth transfers suggesting layering.
4. Total volume relative to the dataset average.",
        PatternKind::RoundAmounts => "\
1. Round amounts just under thresholds ($9,000 to $9,999; $4,000 to $4,999).
2. The same users repeatedly sending round amounts.
3. Coordinated timing of round-amount transfers.
4. Share of round amounts relative to the whole dataset.",
        PatternKind::HighActivityPeriods => "\
1. Spikes in hourly volume well above the norm.
2. Many distinct senders acting within the same hour (coordination).
3. Off-hours bursts that suggest automation.
4. Concentration of high-value transfers inside one window.",
        PatternKind::RepeatedAmounts => "\
1. Exact amounts repeated across different senders and receivers.
2. Uniformity that suggests scripting or a shared playbook.
3. Whether the amount could plausibly be a fixed price for goods or services.",
        PatternKind::QuickSuccessive => "\
1. Transfers seconds apart that suggest scripted activity.
2. Small test transfers followed by larger ones.
3. Rapid onward movement of funds (layering).
4. Senders with many quick successive transfers.",
    }
}

fn dataset_context(summary: &SummaryStats) -> String {
    let (start, end) = match &summary.date_range {
        Some(range) => (timefmt::display(&range.start), timefmt::display(&range.end)),
        None => ("Unknown".to_string(), "Unknown".to_string()),
    };
    format!(
        "DATASET CONTEXT:\n\
         - Total transactions: {}\n\
         - Unique senders: {}\n\
         - Unique receivers: {}\n\
         - Total amount: ${:.2}\n\
         - Average transaction: ${:.2}\n\
         - Date range: {} to {}\n",
        summary.total_transactions,
        summary.unique_senders,
        summary.unique_receivers,
        summary.total_amount,
        summary.average_amount,
        start,
        end,
    )
}

/// Build the analysis request for one pattern kind.
pub fn build_analysis_request(
    kind: PatternKind,
    patterns: &PatternSet,
    summary: &SummaryStats,
    config: &PromptConfig,
    params: GenerationParams,
) -> AnalysisRequest {
    let cap = record_cap(kind, config);
    let records = patterns.records(kind, cap);
    let records_json =
        serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string());

    let prompt = format!(
        "{ANALYST_FRAMING}\n{context}\n\
         PATTERN: {label} ({kind})\n\
         Showing {shown} of {total} detected records.\n\n\
         RECORDS:\n{records_json}\n\n\
         FOCUS ON:\n{focus}\n\n\
         Respond with a single JSON object in exactly this format and nothing else:\n\
         {OUTPUT_SCHEMA}\n",
        context = dataset_context(summary),
        label = kind.label(),
        kind = kind.as_str(),
        shown = records.len(),
        total = patterns.count(kind),
        focus = focus_points(kind),
    );

    AnalysisRequest {
        pattern_type: kind,
        prompt,
        params,
        record_count: records.len(),
        total_records: patterns.count(kind),
    }
}

/// Prompt asking for a short executive summary over the aggregated result.
pub fn build_summary_prompt(
    total_threads: usize,
    kinds_analyzed: usize,
    overall: RiskLevel,
    top: &[TaggedThread],
) -> String {
    let findings: Vec<&str> = top.iter().map(|t| t.thread.description.as_str()).collect();
    let findings_json =
        serde_json::to_string_pretty(&findings).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Based on an AML review of transaction patterns, write an executive summary.\n\n\
         - Total suspicious threads identified: {total_threads}\n\
         - Pattern types analyzed: {kinds_analyzed}\n\
         - Overall risk assessment: {overall}\n\n\
         Key findings:\n{findings_json}\n\n\
         Reply with a brief executive summary (2-3 sentences) followed by key recommendations. \
         Plain text only.\n"
    )
}
