//! The suggester engine: corpus registry, build pool and search

use super::state::{
    BuildCancel, BuildReport, CorpusFailure, CorpusSlot, CorpusStatus, EngineStatus, InFlightBuild,
    ResultFilter, SearchResponse,
};
use crate::config::SuggesterConfig;
use crate::corpus::{CorpusSource, NamedCorpus};
use crate::error::{SuggesterError, SuggesterResult};
use crate::index::{
    build_index, validate_corpus_name, BuildOptions, BuildOutcome, IndexStorage,
    PopularityCounts, SuggestionIndex,
};
use crate::merger::{top_k, LookupResultItem, ResultMerger};
use crate::metrics::{init_suggester_metrics, SUGGESTER_METRICS};
use crate::query::SuggesterQuery;
use crate::scheduler::{RebuildScheduler, RebuildTrigger};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Term-suggestion engine over any number of named corpora
///
/// Cheap to clone; clones share the same corpora, build pool and scheduler.
#[derive(Clone)]
pub struct SuggesterEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: SuggesterConfig,
    storage: IndexStorage,

    /// Registered corpora; the guard is never held across I/O or an await
    corpora: Mutex<HashMap<String, CorpusSlot>>,

    /// Corpora whose removal is still deleting storage; never re-registered meanwhile.
    /// Locked only while `corpora` is held.
    removing: Mutex<HashSet<String>>,

    /// Bounded build pool shared by init, rebuild, lazy and scheduled builds
    pool: Arc<Semaphore>,

    closed: AtomicBool,
    scheduler: tokio::sync::Mutex<Option<RebuildScheduler>>,
    next_epoch: AtomicU64,
}

/// Work handed from `submit_build` to the build task
struct BuildJob {
    corpus: String,
    epoch: u64,
    source: Arc<dyn CorpusSource>,
    current: Option<Arc<SuggestionIndex>>,
    popularity: Arc<PopularityCounts>,
    cancel: Arc<BuildCancel>,
    reuse_persisted: bool,
}

impl SuggesterEngine {
    /// Validate `config` and create an engine; nothing is read from storage yet
    pub fn new(config: SuggesterConfig) -> SuggesterResult<Self> {
        config.validate()?;
        init_suggester_metrics();

        info!(
            storage_root = %config.storage_root.display(),
            max_results = config.max_results,
            rebuild_interval_ms = config.rebuild_interval_ms,
            build_workers = config.max_concurrent_builds,
            "Creating suggester engine"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                storage: IndexStorage::new(config.storage_root.clone()),
                pool: Arc::new(Semaphore::new(config.max_concurrent_builds)),
                config,
                corpora: Mutex::new(HashMap::new()),
                removing: Mutex::new(HashSet::new()),
                closed: AtomicBool::new(false),
                scheduler: tokio::sync::Mutex::new(None),
                next_epoch: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &SuggesterConfig {
        &self.inner.config
    }

    /// Register `corpora` and start building them in the background
    ///
    /// Returns as soon as the builds are submitted. A persisted index whose
    /// generation still matches the corpus is loaded instead of rebuilt.
    /// Corpora outside the allow-list are ignored. The first call also starts
    /// the rebuild scheduler.
    pub async fn init(&self, corpora: &[NamedCorpus]) -> SuggesterResult<()> {
        self.ensure_open()?;
        self.start_scheduler().await?;

        let mut submitted = 0;
        for corpus in corpora {
            if !self.inner.admits(&corpus.name) {
                continue;
            }
            if self
                .inner
                .submit_build(&corpus.name, Some(corpus.source.clone()), true)
                .is_some()
            {
                submitted += 1;
            }
        }

        info!(
            requested = corpora.len(),
            submitted = submitted,
            "Submitted corpus builds"
        );
        Ok(())
    }

    /// Rebuild `corpora` from scratch and wait until every build has finished
    ///
    /// A corpus that already has a build in flight is not built twice; the
    /// call waits for that build instead. Fails with the first `BuildFailure`
    /// after all corpora are done.
    pub async fn rebuild(&self, corpora: &[NamedCorpus]) -> SuggesterResult<()> {
        self.ensure_open()?;

        let pending: Vec<_> = corpora
            .iter()
            .filter(|corpus| self.inner.admits(&corpus.name))
            .filter_map(|corpus| {
                self.inner
                    .submit_build(&corpus.name, Some(corpus.source.clone()), false)
                    .map(|done| (corpus.name.clone(), done))
            })
            .collect();

        let reports = futures::future::join_all(
            pending
                .into_iter()
                .map(|(name, done)| async move { (name, wait_for_report(done).await) }),
        )
        .await;

        self.ensure_open()?;

        reports
            .into_iter()
            .find_map(|(corpus, report)| match report {
                BuildReport::Failed(message) => {
                    Some(Err(SuggesterError::BuildFailure { corpus, message }))
                }
                BuildReport::Finished(_) => None,
            })
            .unwrap_or(Ok(()))
    }

    /// Complete `query` over every ready corpus in `readers`
    ///
    /// Corpora without an installed index contribute nothing; when lazy builds
    /// are enabled a background build is started for them. Lookups run
    /// concurrently under the configured time threshold.
    pub async fn search(
        &self,
        readers: &[NamedCorpus],
        query: Arc<dyn SuggesterQuery>,
        filter: Option<ResultFilter>,
    ) -> SuggesterResult<SearchResponse> {
        let start = Instant::now();
        self.ensure_open()?;
        query.validate()?;

        let config = &self.inner.config;
        let mut targets = Vec::new();
        let mut missing = Vec::new();
        {
            let corpora = self.inner.corpora.lock();
            let mut seen = HashSet::new();
            for reader in readers {
                if !seen.insert(reader.name.as_str()) || !config.is_corpus_allowed(&reader.name) {
                    continue;
                }
                match corpora.get(&reader.name) {
                    Some(CorpusSlot {
                        live: Some(index),
                        popularity,
                        ..
                    }) => targets.push((reader.name.clone(), index.clone(), popularity.clone())),
                    _ => missing.push(reader),
                }
            }
        }

        if config.allow_lazy_build {
            for reader in missing {
                if validate_corpus_name(&reader.name).is_ok() {
                    debug!(corpus = %reader.name, "Corpus not built yet, building lazily");
                    self.inner
                        .submit_build(&reader.name, Some(reader.source.clone()), true);
                }
            }
        }

        let max_results = config.max_results;
        let most_popular = config.allow_most_popular;
        let mut outstanding: HashSet<String> = targets.iter().map(|t| t.0.clone()).collect();

        let mut lookups: FuturesUnordered<_> = targets
            .into_iter()
            .map(|(name, index, popularity)| {
                let query = query.clone();
                let filter = filter.clone();
                let corpus = name.clone();
                let task = tokio::task::spawn_blocking(move || {
                    let popularity = most_popular.then_some(popularity.as_ref());
                    lookup_corpus(
                        &corpus,
                        &index,
                        query.as_ref(),
                        filter.as_ref(),
                        popularity,
                        max_results,
                    )
                });
                async move { (name, task.await) }
            })
            .collect();

        let deadline = tokio::time::Instant::now() + config.search_timeout();
        let mut lists = Vec::new();
        let mut failed_corpora = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, lookups.next()).await {
                Ok(Some((name, Ok(items)))) => {
                    outstanding.remove(&name);
                    lists.push(items);
                }
                Ok(Some((name, Err(e)))) => {
                    warn!(corpus = %name, error = %e, "Suggestion lookup failed");
                    outstanding.remove(&name);
                    failed_corpora.push(name);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        corpora = outstanding.len(),
                        timeout_ms = config.search_timeout_ms,
                        "Search time threshold exceeded, returning partial suggestions"
                    );
                    failed_corpora.extend(outstanding.drain());
                    break;
                }
            }
        }
        failed_corpora.sort();

        let items = ResultMerger::merge(max_results, lists);
        let partial = !failed_corpora.is_empty();
        let elapsed = start.elapsed();
        SUGGESTER_METRICS.record_search(partial, elapsed.as_secs_f64());

        debug!(
            field = %query.field(),
            corpora = readers.len(),
            results = items.len(),
            partial = partial,
            duration_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        Ok(SearchResponse {
            items,
            partial,
            failed_corpora,
            elapsed,
        })
    }

    /// Untrack `names`, cancel their builds and delete their storage
    ///
    /// Names that are not tracked are skipped. A storage failure is reported
    /// after every corpus has been processed; the corpus stays untracked.
    pub async fn remove(&self, names: &[String]) -> SuggesterResult<()> {
        self.ensure_open()?;

        let removed: Vec<(String, CorpusSlot)> = {
            let mut corpora = self.inner.corpora.lock();
            let mut removing = self.inner.removing.lock();
            names
                .iter()
                .filter_map(|name| corpora.remove(name).map(|slot| (name.clone(), slot)))
                .inspect(|(name, _)| {
                    removing.insert(name.clone());
                })
                .collect()
        };
        let _removing = RemovalGuard {
            inner: &self.inner,
            names: removed.iter().map(|(name, _)| name.clone()).collect(),
        };

        for (_, slot) in &removed {
            if let Some(in_flight) = &slot.in_flight {
                in_flight.cancel.cancel();
            }
        }

        let mut first_error = None;
        for (name, slot) in removed {
            if let Some(in_flight) = &slot.in_flight {
                wait_for_report(in_flight.done.clone()).await;
            }
            if slot.live.is_some() {
                SUGGESTER_METRICS.ready_corpora.dec();
            }
            drop(slot);

            let storage = self.inner.storage.clone();
            let corpus = name.clone();
            let deleted = tokio::task::spawn_blocking(move || storage.delete(&corpus))
                .await
                .map_err(|e| e.to_string())
                .and_then(|result| result.map_err(|e| e.to_string()));

            match deleted {
                Ok(()) => info!(corpus = %name, "Removed corpus"),
                Err(message) => {
                    warn!(corpus = %name, error = %message, "Failed to delete corpus storage");
                    first_error.get_or_insert(SuggesterError::StorageError {
                        corpus: name,
                        message,
                    });
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop the scheduler, cancel builds and make the engine unusable
    ///
    /// Installed versions stay on disk and are picked up by the next engine
    /// pointed at the same storage root. Calling it again is a no-op.
    pub async fn close(&self) -> SuggesterResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing suggester engine");

        if let Some(scheduler) = self.inner.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
        self.inner.pool.close();

        let pending: Vec<_> = {
            let corpora = self.inner.corpora.lock();
            corpora
                .values()
                .filter_map(|slot| slot.in_flight.as_ref())
                .map(|in_flight| {
                    in_flight.cancel.cancel();
                    in_flight.done.clone()
                })
                .collect()
        };
        futures::future::join_all(pending.into_iter().map(wait_for_report)).await;

        let slots: Vec<(String, CorpusSlot)> = self.inner.corpora.lock().drain().collect();
        let ready = slots.iter().filter(|(_, slot)| slot.live.is_some()).count();
        SUGGESTER_METRICS.ready_corpora.sub(ready as f64);

        if self.inner.config.allow_most_popular {
            let storage = self.inner.storage.clone();
            let counts: Vec<_> = slots
                .iter()
                .filter(|(_, slot)| slot.live.is_some())
                .map(|(name, slot)| (name.clone(), slot.popularity.clone()))
                .collect();
            let saved = tokio::task::spawn_blocking(move || {
                for (name, popularity) in counts {
                    if let Err(e) = popularity.save(&storage.popularity_path(&name)) {
                        warn!(corpus = %name, error = %e, "Failed to save search counts");
                    }
                }
            })
            .await;
            if let Err(e) = saved {
                warn!(error = %e, "Saving search counts did not complete");
            }
        }
        drop(slots);

        info!(corpora = ready, "Suggester engine closed");
        Ok(())
    }

    /// Engine-wide counters
    pub fn status(&self) -> SuggesterResult<EngineStatus> {
        self.ensure_open()?;
        let corpora = self.inner.corpora.lock();
        Ok(EngineStatus {
            registered: corpora.len(),
            ready: corpora.values().filter(|slot| slot.live.is_some()).count(),
            building: corpora.values().filter(|slot| slot.in_flight.is_some()).count(),
        })
    }

    /// Status of one corpus, `None` if it is not tracked
    pub fn corpus_status(&self, name: &str) -> SuggesterResult<Option<CorpusStatus>> {
        self.ensure_open()?;
        Ok(self.inner.corpora.lock().get(name).map(|slot| slot.status(name)))
    }

    /// Whether `name` has an installed index
    pub fn is_ready(&self, name: &str) -> SuggesterResult<bool> {
        self.ensure_open()?;
        Ok(self
            .inner
            .corpora
            .lock()
            .get(name)
            .map_or(false, |slot| slot.live.is_some()))
    }

    /// Record that `terms` were searched for in `corpora`
    ///
    /// Only terms the corpus actually suggests are counted. No-op unless
    /// most-popular ranking is enabled.
    pub fn on_search(&self, corpora: &[String], terms: &[(String, String)]) -> SuggesterResult<()> {
        self.ensure_open()?;
        if !self.inner.config.allow_most_popular {
            return Ok(());
        }

        let targets: Vec<_> = {
            let slots = self.inner.corpora.lock();
            corpora
                .iter()
                .filter_map(|name| slots.get(name))
                .filter_map(|slot| Some((slot.live.clone()?, slot.popularity.clone())))
                .collect()
        };

        for (index, popularity) in targets {
            for (field, term) in terms {
                if index.contains(field, term) {
                    popularity.increment(field, term, 1);
                }
            }
        }
        Ok(())
    }

    /// Add `by` to the search count of `term` in `corpus`
    pub fn increase_search_count(
        &self,
        corpus: &str,
        field: &str,
        term: &str,
        by: u64,
    ) -> SuggesterResult<()> {
        self.ensure_open()?;
        if !self.inner.config.allow_most_popular {
            return Ok(());
        }
        if let Some(popularity) = self.popularity(corpus) {
            popularity.increment(field, term, by);
        }
        Ok(())
    }

    /// One page of the search counts of `field` in `corpus`, highest first
    pub fn search_counts(
        &self,
        corpus: &str,
        field: &str,
        page: usize,
        page_size: usize,
    ) -> SuggesterResult<Vec<(String, u64)>> {
        self.ensure_open()?;
        if !self.inner.config.allow_most_popular {
            return Ok(Vec::new());
        }
        Ok(self
            .popularity(corpus)
            .map(|popularity| popularity.page(field, page, page_size))
            .unwrap_or_default())
    }

    fn popularity(&self, corpus: &str) -> Option<Arc<PopularityCounts>> {
        self.inner
            .corpora
            .lock()
            .get(corpus)
            .map(|slot| slot.popularity.clone())
    }

    fn ensure_open(&self) -> SuggesterResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SuggesterError::EngineClosed);
        }
        Ok(())
    }

    async fn start_scheduler(&self) -> SuggesterResult<()> {
        let mut scheduler = self.inner.scheduler.lock().await;
        if scheduler.is_some() {
            return Ok(());
        }
        self.ensure_open()?;

        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let trigger: RebuildTrigger = Arc::new(move |schedule: &'static str| {
            if let Some(inner) = engine.upgrade() {
                inner.rebuild_tracked(schedule);
            }
        });

        *scheduler = Some(
            RebuildScheduler::start(
                self.inner.config.rebuild_interval(),
                self.inner.config.rebuild_cron.as_deref(),
                trigger,
            )
            .await?,
        );
        Ok(())
    }
}

impl EngineInner {
    fn admits(&self, name: &str) -> bool {
        if !self.config.is_corpus_allowed(name) {
            debug!(corpus = %name, "Corpus is not in the allow-list, ignoring");
            return false;
        }
        if let Err(e) = validate_corpus_name(name) {
            warn!(corpus = %name, error = %e, "Ignoring corpus");
            return false;
        }
        true
    }

    /// Submit a background build, or join the one already in flight
    ///
    /// Registers the corpus if `source` is given and it is unknown. Returns
    /// `None` once the engine is closed, while the corpus is being removed, or
    /// when an unknown corpus has no source.
    fn submit_build(
        self: &Arc<Self>,
        name: &str,
        source: Option<Arc<dyn CorpusSource>>,
        reuse_persisted: bool,
    ) -> Option<watch::Receiver<Option<BuildReport>>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let (job, report, done) = {
            let mut corpora = self.corpora.lock();
            if self.removing.lock().contains(name) {
                debug!(corpus = %name, "Corpus is being removed, not building it");
                return None;
            }
            let slot = match corpora.entry(name.to_string()) {
                Entry::Occupied(entry) => {
                    let slot = entry.into_mut();
                    if let Some(source) = source {
                        slot.source = source;
                    }
                    slot
                }
                Entry::Vacant(entry) => {
                    let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                    entry.insert(CorpusSlot::new(epoch, source?))
                }
            };

            if let Some(in_flight) = &slot.in_flight {
                debug!(corpus = %name, "Build already in flight, joining it");
                return Some(in_flight.done.clone());
            }

            let cancel = Arc::new(BuildCancel::default());
            let (report, done) = watch::channel(None);
            slot.in_flight = Some(InFlightBuild {
                cancel: cancel.clone(),
                done: done.clone(),
            });

            let job = BuildJob {
                corpus: name.to_string(),
                epoch: slot.epoch,
                source: slot.source.clone(),
                current: slot.live.clone(),
                popularity: slot.popularity.clone(),
                cancel,
                reuse_persisted,
            };
            (job, report, done)
        };

        let inner = self.clone();
        tokio::spawn(async move {
            let outcome = inner.run_build(job).await;
            let _ = report.send(Some(outcome));
        });

        Some(done)
    }

    /// Fire-and-forget build of every tracked corpus
    fn rebuild_tracked(self: &Arc<Self>, schedule: &'static str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let names: Vec<String> = self.corpora.lock().keys().cloned().collect();
        info!(schedule = schedule, corpora = names.len(), "Scheduled rebuild");

        for name in names {
            self.submit_build(&name, None, true);
        }
    }

    /// Run one build on the pool and install its result
    async fn run_build(self: Arc<Self>, job: BuildJob) -> BuildReport {
        let start = Instant::now();

        // A queued build gives up its place as soon as it is cancelled
        let permit = tokio::select! {
            permit = self.pool.clone().acquire_owned() => permit.ok(),
            _ = job.cancel.cancelled() => None,
        };

        let result = match permit {
            None => Ok(BuildOutcome::Cancelled),
            Some(_) if job.cancel.is_cancelled() => Ok(BuildOutcome::Cancelled),
            Some(permit) => {
                let inner = self.clone();
                let corpus = job.corpus.clone();
                let source = job.source.clone();
                let current = job.current.clone();
                let popularity = job.popularity.clone();
                let cancel = job.cancel.clone();
                let reuse_persisted = job.reuse_persisted;

                tokio::task::spawn_blocking(move || -> SuggesterResult<BuildOutcome> {
                    let _permit = permit;
                    let outcome = build_index(BuildOptions {
                        corpus: &corpus,
                        source: source.as_ref(),
                        storage: &inner.storage,
                        config: &inner.config,
                        current: current.as_deref(),
                        reuse_persisted,
                        cancelled: cancel.flag(),
                    })?;

                    if inner.config.allow_most_popular
                        && !matches!(outcome, BuildOutcome::Cancelled)
                    {
                        let path = inner.storage.popularity_path(&corpus);
                        if let Err(e) = popularity.load_once(&path).and_then(|_| popularity.save(&path)) {
                            warn!(corpus = %corpus, error = %e, "Failed to sync search counts");
                        }
                    }
                    Ok(outcome)
                })
                .await
                .unwrap_or_else(|e| Err(SuggesterError::build_failure(&job.corpus, e)))
            }
        };

        let elapsed = start.elapsed();
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        SUGGESTER_METRICS.record_build(label, elapsed.as_secs_f64());

        self.finish_build(&job, result)
    }

    /// Publish a build result under the registry guard
    fn finish_build(&self, job: &BuildJob, result: SuggesterResult<BuildOutcome>) -> BuildReport {
        let mut replaced = None;
        let mut discarded = None;

        let report = {
            let mut corpora = self.corpora.lock();
            let slot = corpora
                .get_mut(&job.corpus)
                .filter(|slot| slot.epoch == job.epoch);

            match (slot, result) {
                (None, result) => {
                    debug!(corpus = %job.corpus, "Corpus was removed during its build");
                    discarded = result.ok();
                    BuildReport::Finished("cancelled")
                }
                (Some(slot), result) => {
                    slot.in_flight = None;
                    match result {
                        Ok(BuildOutcome::Installed(index)) | Ok(BuildOutcome::Loaded(index))
                            if !self.closed.load(Ordering::Acquire) =>
                        {
                            info!(
                                corpus = %job.corpus,
                                generation = index.generation(),
                                entries = index.len(),
                                "Suggestion index installed"
                            );
                            if slot.live.is_none() {
                                SUGGESTER_METRICS.ready_corpora.inc();
                            }
                            replaced = slot.live.replace(Arc::new(index));
                            slot.last_failure = None;
                            BuildReport::Finished("installed")
                        }
                        Ok(BuildOutcome::Unchanged) => {
                            slot.last_failure = None;
                            BuildReport::Finished("unchanged")
                        }
                        Ok(outcome) => {
                            discarded = Some(outcome);
                            BuildReport::Finished("cancelled")
                        }
                        Err(e) => {
                            warn!(
                                corpus = %job.corpus,
                                source = %job.source.describe(),
                                error = %e,
                                "Suggestion index build failed"
                            );
                            let message = match e {
                                SuggesterError::BuildFailure { message, .. } => message,
                                other => other.to_string(),
                            };
                            slot.last_failure = Some(CorpusFailure {
                                message: message.clone(),
                                at: Utc::now(),
                            });
                            BuildReport::Failed(message)
                        }
                    }
                }
            }
        };

        // Dropped outside the guard: a retired version deletes its directory
        if let Some(old) = replaced {
            old.retire();
            drop(old);
        }
        drop(discarded);

        report
    }
}

/// Lifts the removal tombstones of `names` when dropped
struct RemovalGuard<'a> {
    inner: &'a EngineInner,
    names: Vec<String>,
}

impl Drop for RemovalGuard<'_> {
    fn drop(&mut self) {
        let _corpora = self.inner.corpora.lock();
        let mut removing = self.inner.removing.lock();
        for name in &self.names {
            removing.remove(name);
        }
    }
}

/// Wait until the build behind `done` reports
async fn wait_for_report(mut done: watch::Receiver<Option<BuildReport>>) -> BuildReport {
    let reported = done.wait_for(Option::is_some).await.map(|report| report.clone());
    match reported {
        Ok(report) => report.unwrap_or(BuildReport::Finished("cancelled")),
        Err(_) => BuildReport::Failed("build task ended without reporting".to_string()),
    }
}

/// Lookup, score and filter within one corpus, keeping its best `max_results`
fn lookup_corpus(
    corpus: &str,
    index: &SuggestionIndex,
    query: &dyn SuggesterQuery,
    filter: Option<&ResultFilter>,
    popularity: Option<&PopularityCounts>,
    max_results: usize,
) -> Vec<LookupResultItem> {
    let mut items: Vec<LookupResultItem> = index
        .lookup(query)
        .into_iter()
        .map(|entry| {
            let score = match popularity {
                Some(counts) => counts.ranked_score(&entry.field, &entry.term, entry.score),
                None => entry.score,
            };
            LookupResultItem::new(entry.term, entry.field, corpus, score)
        })
        .filter(|item| filter.map_or(true, |keep| keep(item)))
        .collect();

    top_k(&mut items, max_results);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuggesterConfigBuilder;
    use crate::corpus::CorpusSnapshot;
    use crate::index::{IndexMeta, SuggestionEntry};
    use crate::query::PrefixQuery;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct OfflineCorpus;

    impl CorpusSource for OfflineCorpus {
        fn open(&self) -> SuggesterResult<Box<dyn CorpusSnapshot>> {
            Err(SuggesterError::Source("offline".to_string()))
        }

        fn describe(&self) -> String {
            "offline".to_string()
        }
    }

    fn index(entries: &[(&str, u64)]) -> SuggestionIndex {
        let entries: Vec<SuggestionEntry> = entries
            .iter()
            .map(|(term, score)| SuggestionEntry {
                field: "body".to_string(),
                term: term.to_string(),
                score: *score,
            })
            .collect();
        let meta = IndexMeta {
            corpus: "p".to_string(),
            generation: 1,
            built_at: Utc::now(),
            entry_count: entries.len(),
            fields: vec!["body".to_string()],
        };
        SuggestionIndex::from_parts(PathBuf::from("/nonexistent"), meta, entries)
    }

    #[test]
    fn test_lookup_applies_filter_and_bound() {
        let index = index(&[("term1", 1), ("term2", 5), ("term3", 3), ("other", 9)]);
        let query = PrefixQuery::new("body", "term");
        let filter: ResultFilter = Arc::new(|item: &LookupResultItem| item.phrase != "term3");

        let items = lookup_corpus("p", &index, &query, Some(&filter), None, 1);
        assert_eq!(items, vec![LookupResultItem::new("term2", "body", "p", 5)]);
    }

    #[test]
    fn test_lookup_ranks_by_search_counts() {
        let index = index(&[("term1", 1), ("term2", 5)]);
        let counts = PopularityCounts::new();
        counts.increment("body", "term1", 2);

        let items = lookup_corpus("p", &index, &PrefixQuery::new("body", "t"), None, Some(&counts), 10);
        let phrases: Vec<_> = items.iter().map(|i| i.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["term1", "term2"]);
    }

    #[tokio::test]
    async fn test_wait_for_report_after_sender_dropped() {
        let (report, done) = watch::channel(None);
        drop(report);
        assert!(matches!(
            wait_for_report(done).await,
            BuildReport::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_report_returns_sent_value() {
        let (report, done) = watch::channel(None);
        report.send(Some(BuildReport::Finished("installed"))).unwrap();
        assert_eq!(wait_for_report(done).await, BuildReport::Finished("installed"));
    }

    #[tokio::test]
    async fn test_corpus_being_removed_is_not_registered() {
        let temp_dir = TempDir::new().unwrap();
        let config = SuggesterConfigBuilder::new()
            .storage_root(temp_dir.path())
            .rebuild_interval(Duration::from_secs(3600))
            .build();
        let engine = SuggesterEngine::new(config).unwrap();
        let source: Arc<dyn CorpusSource> = Arc::new(OfflineCorpus);

        engine.inner.removing.lock().insert("p".to_string());
        assert!(engine.inner.submit_build("p", Some(source.clone()), true).is_none());
        assert!(engine.corpus_status("p").unwrap().is_none());

        engine.inner.removing.lock().clear();
        assert!(engine.inner.submit_build("p", Some(source), true).is_some());
        assert!(engine.corpus_status("p").unwrap().is_some());

        engine.close().await.unwrap();
    }
}
