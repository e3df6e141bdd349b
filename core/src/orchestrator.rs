//! Analysis orchestration: detect, ask the model per pattern kind, fall back
//! where it fails, aggregate, and cache.
//!
//! RULE: a run never fails because of the model. Each kind resolves to a
//! structurally valid `PatternAnalysis`, either from the model or from the
//! deterministic rules in `fallback`, and the reason for any substitution is
//! kept on the report as a `Degradation`.

use crate::{
    analysis::{
        self, AnalysisReport, Degradation, KindAnalysis, OverallAssessment, PatternAnalysis,
        PatternSummary, RiskLevel,
    },
    cache::{AnalysisCache, CacheEntry, CacheLookup},
    clock::{Clock, SystemClock},
    config::AnalyzerConfig,
    fallback,
    llm::{self, GeminiClient, LlmClient, LlmError},
    loader::Dataset,
    outcome::StepOutcome,
    parser,
    patterns::{PatternKind, PatternSet},
    prompt,
    summary::SummaryStats,
    types::DatasetVersion,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

const SUMMARY_STEP: &str = "executive_summary";

/// Where the orchestrator is in a run. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    CheckCache,
    ReturnCached,
    Compute,
    Detecting,
    Analyzing(PatternKind),
    Aggregating,
    Cached,
}

/// Result of `analyze`: the entry that answers the request, and whether it
/// was served from cache.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub entry: Arc<CacheEntry>,
    pub cached: bool,
}

pub struct AnalysisOrchestrator {
    config: AnalyzerConfig,
    llm: Option<Arc<dyn LlmClient>>,
    cache: AnalysisCache,
    clock: Arc<dyn Clock>,
    state: RwLock<RunState>,
}

impl AnalysisOrchestrator {
    pub fn new(config: AnalyzerConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        let cache = AnalysisCache::new(config.cache_ttl());
        Self {
            config,
            llm,
            cache,
            clock: Arc::new(SystemClock),
            state: RwLock::new(RunState::Idle),
        }
    }

    /// Build with a Gemini client when an API key is configured.
    pub fn from_config(config: AnalyzerConfig) -> Self {
        let llm: Option<Arc<dyn LlmClient>> = match GeminiClient::new(&config.llm) {
            Ok(client) => {
                log::info!("LLM capability configured (model {})", config.llm.model);
                Some(Arc::new(client))
            }
            Err(LlmError::NotConfigured) => {
                log::warn!("No LLM API key configured; analyses will use fallback rules");
                None
            }
            Err(e) => {
                log::error!("Could not build LLM client, using fallback rules: {e}");
                None
            }
        };
        Self::new(config, llm)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn llm_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop any cached analysis. Called on every dataset swap.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Latest analysis for `version`, even if past its TTL.
    pub fn latest(&self, version: DatasetVersion) -> Option<Arc<CacheEntry>> {
        self.cache.latest_for(version)
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        log::debug!("analysis run: {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Serve a valid cached analysis for `dataset`, or compute and cache a new one.
    pub fn analyze(&self, dataset: &Dataset) -> AnalysisOutcome {
        self.transition(RunState::CheckCache);
        match self.cache.lookup(dataset.version, self.clock.now()) {
            CacheLookup::Hit(entry) => {
                self.transition(RunState::ReturnCached);
                self.transition(RunState::Idle);
                return AnalysisOutcome { entry, cached: true };
            }
            CacheLookup::Miss(reason) => {
                log::debug!("cache miss for dataset v{}: {reason:?}", dataset.version);
            }
        }

        self.transition(RunState::Compute);
        let report = self.compute(dataset);
        let entry = self.cache.store(CacheEntry {
            dataset_version: dataset.version,
            computed_at: report.computed_at,
            report,
        });
        self.transition(RunState::Cached);
        self.transition(RunState::Idle);
        AnalysisOutcome { entry, cached: false }
    }

    fn compute(&self, dataset: &Dataset) -> AnalysisReport {
        self.transition(RunState::Detecting);
        let patterns = dataset.patterns();
        let summary = dataset.summary();

        let mut analyses = Vec::with_capacity(PatternKind::ALL.len());
        let mut degradations = Vec::new();
        for kind in PatternKind::ALL {
            if patterns.count(kind) == 0 {
                analyses.push(KindAnalysis {
                    pattern_type: kind,
                    analysis: PatternAnalysis::no_records(kind),
                });
                continue;
            }
            self.transition(RunState::Analyzing(kind));
            let (analysis, reason) = self.analyze_kind(kind, &patterns, &summary).into_parts();
            if let Some(reason) = reason {
                degradations.push(Degradation {
                    step: kind.as_str().to_string(),
                    reason,
                });
            }
            log::info!(
                "Analyzed {kind}: {} threads, risk {} ({:?})",
                analysis.threads.len(),
                analysis.risk_level,
                analysis.source
            );
            analyses.push(KindAnalysis { pattern_type: kind, analysis });
        }

        self.transition(RunState::Aggregating);
        ensure_unique_thread_ids(&mut analyses);

        let kinds_analyzed = patterns.non_empty_kinds().len();
        let all_threads: Vec<_> = analyses
            .iter()
            .flat_map(|ka| {
                ka.analysis.threads.iter().map(move |t| analysis::TaggedThread {
                    pattern_type: ka.pattern_type,
                    thread: t.clone(),
                })
            })
            .collect();
        let total_threads = all_threads.len();
        let levels: Vec<RiskLevel> = analyses.iter().map(|ka| ka.analysis.risk_level).collect();
        let overall_risk_level = analysis::overall_risk(&levels);
        let top_threats = analysis::top_threats(all_threads);

        let (executive_summary, reason) = self
            .executive_summary(total_threads, kinds_analyzed, overall_risk_level, &top_threats)
            .into_parts();
        if let Some(reason) = reason {
            degradations.push(Degradation {
                step: SUMMARY_STEP.to_string(),
                reason,
            });
        }

        let pattern_summary: BTreeMap<PatternKind, PatternSummary> = analyses
            .iter()
            .map(|ka| {
                (
                    ka.pattern_type,
                    PatternSummary {
                        thread_count: ka.analysis.threads.len(),
                        risk_level: ka.analysis.risk_level,
                    },
                )
            })
            .collect();

        let report = AnalysisReport {
            run_id: uuid::Uuid::new_v4(),
            dataset_version: dataset.version,
            computed_at: self.clock.now(),
            analyses,
            overall_assessment: OverallAssessment {
                total_threads,
                overall_risk_level,
                executive_summary,
                pattern_summary,
                top_threats,
            },
            degradations,
        };
        log::info!(
            "Analysis {} complete for dataset v{}: {} threads, overall risk {}, {} degraded steps",
            report.run_id,
            report.dataset_version,
            total_threads,
            overall_risk_level,
            report.degradations.len()
        );
        report
    }

    fn analyze_kind(
        &self,
        kind: PatternKind,
        patterns: &PatternSet,
        summary: &SummaryStats,
    ) -> StepOutcome<PatternAnalysis> {
        let Some(client) = &self.llm else {
            let reason = LlmError::NotConfigured.to_string();
            log::warn!("Using fallback analysis for {kind}: {reason}");
            return StepOutcome::degraded(fallback::analyze(kind, patterns).with_error(&reason), reason);
        };

        let request = prompt::build_analysis_request(
            kind,
            patterns,
            summary,
            &self.config.prompt,
            self.config.llm.analysis_params(),
        );
        log::debug!(
            "Prompting {} for {kind} with {} of {} records",
            client.name(),
            request.record_count,
            request.total_records
        );

        match llm::generate_with_timeout(
            Arc::clone(client),
            request.prompt,
            request.params,
            self.config.llm.timeout(),
        ) {
            Ok(text) => StepOutcome::Completed(parser::parse_response(&text, kind)),
            Err(e) => {
                let reason = e.to_string();
                log::error!("LLM analysis failed for {kind}, using fallback: {reason}");
                StepOutcome::degraded(fallback::analyze(kind, patterns).with_error(&reason), reason)
            }
        }
    }

    fn executive_summary(
        &self,
        total_threads: usize,
        kinds_analyzed: usize,
        overall: RiskLevel,
        top: &[analysis::TaggedThread],
    ) -> StepOutcome<String> {
        let fallback_text = format!(
            "Analysis completed. {total_threads} suspicious threads identified across {kinds_analyzed} pattern types."
        );
        let Some(client) = &self.llm else {
            return StepOutcome::Completed(fallback_text);
        };

        let prompt = prompt::build_summary_prompt(total_threads, kinds_analyzed, overall, top);
        let result = llm::generate_with_timeout(
            Arc::clone(client),
            prompt,
            self.config.llm.summary_params(),
            self.config.llm.timeout(),
        )
        .and_then(|text| {
            let text = text.trim();
            if text.is_empty() {
                Err(LlmError::EmptyResponse)
            } else {
                Ok(text.to_string())
            }
        });

        match result {
            Ok(text) => StepOutcome::Completed(text),
            Err(e) => {
                log::warn!("Executive summary generation failed: {e}");
                StepOutcome::degraded(fallback_text, e.to_string())
            }
        }
    }
}

/// Give every thread a distinct id, in analysis order.
///
/// Missing ids become `<pattern_type>_<n>`; repeats get `-2`, `-3`, ...
fn ensure_unique_thread_ids(analyses: &mut [KindAnalysis]) {
    let mut seen: HashSet<String> = HashSet::new();
    for ka in analyses.iter_mut() {
        let kind = ka.pattern_type;
        for (i, thread) in ka.analysis.threads.iter_mut().enumerate() {
            let base = match thread.thread_id.trim() {
                "" => format!("{kind}_{}", i + 1),
                id => id.to_string(),
            };
            let mut candidate = base.clone();
            let mut n = 2;
            while seen.contains(&candidate) {
                candidate = format!("{base}-{n}");
                n += 1;
            }
            seen.insert(candidate.clone());
            thread.thread_id = candidate;
        }
    }
}
