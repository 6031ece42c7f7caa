//! Per-corpus bookkeeping and the status views built from it

use crate::corpus::CorpusSource;
use crate::index::{PopularityCounts, SuggestionIndex};
use crate::merger::LookupResultItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Caller-supplied predicate; items it rejects are dropped before merging
pub type ResultFilter = Arc<dyn Fn(&LookupResultItem) -> bool + Send + Sync>;

/// How a build ended, as seen by whoever waits on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BuildReport {
    Finished(&'static str),
    Failed(String),
}

/// Cancellation of one build, visible to the blocking builder and to async waiters
#[derive(Default)]
pub(crate) struct BuildCancel {
    flag: AtomicBool,
    notify: Notify,
}

impl BuildCancel {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        // notify_one keeps a permit when nobody is waiting yet
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Flag polled by the builder between steps
    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

/// Marker of the one build allowed in flight for a corpus
pub(crate) struct InFlightBuild {
    pub cancel: Arc<BuildCancel>,
    pub done: watch::Receiver<Option<BuildReport>>,
}

/// Everything the engine tracks for one registered corpus
pub(crate) struct CorpusSlot {
    /// Distinguishes this registration from an earlier one under the same name
    pub epoch: u64,
    pub source: Arc<dyn CorpusSource>,
    pub live: Option<Arc<SuggestionIndex>>,
    pub in_flight: Option<InFlightBuild>,
    pub last_failure: Option<CorpusFailure>,
    pub popularity: Arc<PopularityCounts>,
}

impl CorpusSlot {
    pub fn new(epoch: u64, source: Arc<dyn CorpusSource>) -> Self {
        Self {
            epoch,
            source,
            live: None,
            in_flight: None,
            last_failure: None,
            popularity: Arc::new(PopularityCounts::new()),
        }
    }

    pub fn status(&self, name: &str) -> CorpusStatus {
        CorpusStatus {
            name: name.to_string(),
            ready: self.live.is_some(),
            building: self.in_flight.is_some(),
            generation: self.live.as_ref().map(|index| index.generation()),
            built_at: self.live.as_ref().map(|index| index.meta().built_at),
            entry_count: self.live.as_ref().map(|index| index.len()).unwrap_or(0),
            last_failure: self.last_failure.clone(),
        }
    }
}

/// Most recent build failure of a corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFailure {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Engine-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Corpora known to the engine, built or not
    pub registered: usize,

    /// Corpora with an installed index
    pub ready: usize,

    /// Corpora with a build in flight
    pub building: usize,
}

/// Read-only view of one corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStatus {
    pub name: String,
    pub ready: bool,
    pub building: bool,

    /// Generation marker of the installed index
    pub generation: Option<u64>,
    pub built_at: Option<DateTime<Utc>>,
    pub entry_count: usize,

    /// Cleared by the next successful build
    pub last_failure: Option<CorpusFailure>,
}

/// Outcome of one search
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    /// Merged suggestions, best first
    pub items: Vec<LookupResultItem>,

    /// Some corpus failed or missed the search time threshold
    pub partial: bool,

    /// Corpora that contributed nothing because their lookup failed or timed out
    pub failed_corpora: Vec<String>,

    pub elapsed: Duration,
}

impl SearchResponse {
    /// Suggested phrases in rank order
    pub fn phrases(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.phrase.as_str()).collect()
    }
}
