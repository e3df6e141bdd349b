//! Versioned single-slot cache for the latest analysis.
//!
//! RULE: the slot holds an `Arc` to a fully built entry. Writers build the
//! entry first and then swap the pointer under the write lock, so a reader
//! sees either the previous complete entry or the new one.
//!
//! An entry is valid while its dataset version matches the active dataset
//! and its age does not exceed the TTL.

use crate::{
    analysis::AnalysisReport,
    types::DatasetVersion,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub dataset_version: DatasetVersion,
    pub computed_at: DateTime<Utc>,
    pub report: AnalysisReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Empty,
    Expired,
    DatasetChanged,
}

#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(Arc<CacheEntry>),
    Miss(MissReason),
}

#[derive(Debug)]
pub struct AnalysisCache {
    slot: RwLock<Option<Arc<CacheEntry>>>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            ttl,
        }
    }

    // The slot only ever holds a complete Arc, so a poisoned lock still
    // guards consistent data.
    fn read(&self) -> Option<Arc<CacheEntry>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lookup(&self, version: DatasetVersion, now: DateTime<Utc>) -> CacheLookup {
        match self.read() {
            None => CacheLookup::Miss(MissReason::Empty),
            Some(entry) if entry.dataset_version != version => {
                CacheLookup::Miss(MissReason::DatasetChanged)
            }
            Some(entry) if now - entry.computed_at > self.ttl => {
                CacheLookup::Miss(MissReason::Expired)
            }
            Some(entry) => CacheLookup::Hit(entry),
        }
    }

    /// Latest entry for `version`, regardless of age.
    pub fn latest_for(&self, version: DatasetVersion) -> Option<Arc<CacheEntry>> {
        self.read().filter(|e| e.dataset_version == version)
    }

    /// Publish a new entry, replacing any previous one.
    pub fn store(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&entry));
        log::debug!(
            "Cached analysis {} for dataset v{}",
            entry.report.run_id,
            entry.dataset_version
        );
        entry
    }

    pub fn invalidate(&self) {
        let previous = self.slot.write().unwrap_or_else(PoisonError::into_inner).take();
        if previous.is_some() {
            log::info!("Analysis cache invalidated");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_none()
    }
}
