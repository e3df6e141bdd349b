//! The served operations: load, summary, patterns, analyze, threads, health.
//!
//! RULE: the active dataset is swapped as a whole `Arc`. A swap invalidates
//! the analysis cache before it returns; operations already holding the old
//! snapshot finish against it.
//!
//! Versions are assigned at activation, under the write lock, so the active
//! dataset is always the one activated last and carries the highest version.
//! Concurrent cold `analyze` calls for the same version are not coalesced:
//! each runs its own model calls and the last one to finish owns the cache.

use crate::{
    analysis::{self, AnalysisReport, RiskLevel, TaggedThread},
    error::{PipelineError, PipelineResult},
    loader::{self, Dataset, DatasetSource},
    orchestrator::{AnalysisOrchestrator, RunState},
    patterns::PatternSet,
    summary::SummaryStats,
    types::DatasetVersion,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub version: DatasetVersion,
    pub label: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub report: AnalysisReport,
    pub cached: bool,
    pub degraded: bool,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadsView {
    pub threads: Vec<TaggedThread>,
    pub total_count: usize,
    pub risk_distribution: RiskDistribution,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub llm_configured: bool,
    pub dataset: Option<DatasetInfo>,
    pub analysis_cached: bool,
    pub state: RunState,
}

// Placeholder until `activate` stamps the real version.
const UNASSIGNED_VERSION: DatasetVersion = 0;

pub struct AnalysisService {
    orchestrator: AnalysisOrchestrator,
    active: RwLock<Option<Arc<Dataset>>>,
    next_version: AtomicU64,
}

impl AnalysisService {
    pub fn new(orchestrator: AnalysisOrchestrator) -> Self {
        Self {
            orchestrator,
            active: RwLock::new(None),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    /// Load `source` and make it the active dataset.
    ///
    /// On failure the previously active dataset stays in place and no
    /// version is consumed.
    pub fn load(&self, source: &DatasetSource) -> PipelineResult<DatasetInfo> {
        let dataset = loader::load(source, UNASSIGNED_VERSION)?;
        Ok(self.activate(dataset))
    }

    fn activate(&self, mut dataset: Dataset) -> DatasetInfo {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        dataset.version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let info = info_for(&dataset);
        *active = Some(Arc::new(dataset));
        self.orchestrator.invalidate();
        drop(active);
        log::info!("Active dataset is now v{} ({})", info.version, info.label);
        info
    }

    pub fn current(&self) -> PipelineResult<Arc<Dataset>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PipelineError::NoDataset)
    }

    pub fn summary(&self) -> PipelineResult<SummaryStats> {
        Ok(self.current()?.summary())
    }

    pub fn patterns(&self) -> PipelineResult<PatternSet> {
        Ok(self.current()?.patterns())
    }

    /// Idempotent within the cache TTL.
    pub fn analyze(&self) -> PipelineResult<AnalyzeResponse> {
        let dataset = self.current()?;
        let outcome = self.orchestrator.analyze(&dataset);
        let report = outcome.entry.report.clone();
        Ok(AnalyzeResponse {
            degraded: report.is_degraded(),
            computed_at: outcome.entry.computed_at,
            cached: outcome.cached,
            report,
        })
    }

    /// Threads of the latest analysis for the active dataset, most severe first.
    pub fn threads(&self) -> PipelineResult<ThreadsView> {
        let dataset = self.current()?;
        let entry = self
            .orchestrator
            .latest(dataset.version)
            .ok_or(PipelineError::NoAnalysis)?;

        let threads = analysis::rank_by_severity(entry.report.all_threads());
        let mut risk_distribution = RiskDistribution::default();
        for t in &threads {
            match t.thread.risk_level {
                RiskLevel::High => risk_distribution.high += 1,
                RiskLevel::Medium => risk_distribution.medium += 1,
                RiskLevel::Low => risk_distribution.low += 1,
            }
        }
        Ok(ThreadsView {
            total_count: threads.len(),
            threads,
            risk_distribution,
        })
    }

    pub fn health(&self) -> HealthStatus {
        let dataset = self.current().ok();
        HealthStatus {
            llm_configured: self.orchestrator.llm_configured(),
            analysis_cached: dataset
                .as_ref()
                .is_some_and(|d| self.orchestrator.latest(d.version).is_some()),
            dataset: dataset.as_deref().map(info_for),
            state: self.orchestrator.state(),
        }
    }
}

fn info_for(dataset: &Dataset) -> DatasetInfo {
    DatasetInfo {
        version: dataset.version,
        label: dataset.label.clone(),
        rows: dataset.len(),
    }
}
