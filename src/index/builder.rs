//! Building a corpus's suggestion index from a snapshot of its documents

use crate::config::SuggesterConfig;
use crate::corpus::{CorpusSource, TermStats};
use crate::error::{SuggesterError, SuggesterResult};
use crate::index::{IndexMeta, IndexStorage, SuggestionEntry, SuggestionIndex};
use chrono::Utc;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inputs of one build
pub struct BuildOptions<'a> {
    pub corpus: &'a str,
    pub source: &'a dyn CorpusSource,
    pub storage: &'a IndexStorage,
    pub config: &'a SuggesterConfig,

    /// Version currently served for the corpus, if any
    pub current: Option<&'a SuggestionIndex>,

    /// Keep an existing index (in memory or on disk) whose generation still matches
    pub reuse_persisted: bool,

    /// Set by the engine to abandon the build before install
    pub cancelled: &'a AtomicBool,
}

/// What a build produced
#[derive(Debug)]
pub enum BuildOutcome {
    /// A new version was committed to storage
    Installed(SuggestionIndex),

    /// The persisted version matched the corpus and was loaded as is
    Loaded(SuggestionIndex),

    /// The version already served matches the corpus
    Unchanged,

    /// The build was abandoned; storage is untouched
    Cancelled,
}

impl BuildOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BuildOutcome::Installed(_) => "installed",
            BuildOutcome::Loaded(_) => "loaded",
            BuildOutcome::Unchanged => "unchanged",
            BuildOutcome::Cancelled => "cancelled",
        }
    }
}

/// Build (or reuse) the suggestion index of one corpus
///
/// The new version is assembled in a staging directory and published by
/// rename, so a failure at any step leaves the previously committed version
/// untouched. Every error is reported as a `BuildFailure` for the corpus.
pub fn build_index(opts: BuildOptions<'_>) -> SuggesterResult<BuildOutcome> {
    let corpus = opts.corpus;
    build_inner(opts).map_err(|e| match e {
        SuggesterError::BuildFailure { .. } => e,
        other => SuggesterError::build_failure(corpus, other),
    })
}

fn build_inner(opts: BuildOptions<'_>) -> SuggesterResult<BuildOutcome> {
    let start = Instant::now();
    let corpus = opts.corpus;

    let snapshot = opts.source.open()?;
    let generation = snapshot.generation();

    let mut fields: Vec<String> = snapshot
        .fields()
        .into_iter()
        .filter(|field| opts.config.is_field_allowed(field))
        .collect();
    fields.sort();
    fields.dedup();

    let persisted = match opts.current {
        Some(current) => Some(current.path().to_path_buf()),
        None => opts.storage.current_version(corpus)?,
    };

    if opts.reuse_persisted {
        if let Some(current) = opts.current {
            if current.generation() == generation && current.meta().fields == fields {
                debug!(corpus = %corpus, generation = generation, "Suggestion index is up to date");
                return Ok(BuildOutcome::Unchanged);
            }
        } else if let Some(dir) = &persisted {
            match SuggestionIndex::load(dir) {
                Ok(index) if index.generation() == generation && index.meta().fields == fields => {
                    opts.storage.sweep(corpus, Some(dir.as_path()))?;
                    info!(
                        corpus = %corpus,
                        generation = generation,
                        entries = index.len(),
                        "Loaded persisted suggestion index"
                    );
                    return Ok(BuildOutcome::Loaded(index));
                }
                Ok(index) => {
                    info!(
                        corpus = %corpus,
                        persisted_generation = index.generation(),
                        generation = generation,
                        "Corpus changed since the suggestion index was built, rebuilding"
                    );
                }
                Err(e) => {
                    warn!(corpus = %corpus, error = %e, "Persisted suggestion index is unreadable, rebuilding");
                }
            }
        }
    }

    // Leftovers of interrupted builds; the committed version stays until replaced
    opts.storage.sweep(corpus, persisted.as_deref())?;

    let per_field: Vec<(String, Vec<TermStats>)> = fields
        .par_iter()
        .map(|field| {
            if opts.cancelled.load(Ordering::Acquire) {
                return Ok((field.clone(), Vec::new()));
            }
            snapshot.terms(field).map(|terms| (field.clone(), terms))
        })
        .collect::<SuggesterResult<Vec<_>>>()?;

    // The snapshot can go stale; it must not outlive the build
    drop(snapshot);

    if opts.cancelled.load(Ordering::Acquire) {
        return Ok(BuildOutcome::Cancelled);
    }

    let mut entries: Vec<SuggestionEntry> = per_field
        .into_iter()
        .flat_map(|(field, terms)| {
            terms
                .into_iter()
                .filter(|stats| !stats.term.is_empty())
                .map(move |stats| SuggestionEntry {
                    field: field.clone(),
                    term: stats.term,
                    score: stats.doc_freq,
                })
        })
        .collect();
    entries.sort_unstable_by(|a, b| a.field.cmp(&b.field).then_with(|| a.term.cmp(&b.term)));
    entries.dedup_by(|next, kept| {
        if next.field == kept.field && next.term == kept.term {
            kept.score = kept.score.saturating_add(next.score);
            true
        } else {
            false
        }
    });

    let meta = IndexMeta {
        corpus: corpus.to_string(),
        generation,
        built_at: Utc::now(),
        entry_count: entries.len(),
        fields,
    };

    let staged = opts.storage.stage(corpus)?;
    staged.write(&meta, &entries)?;

    if opts.cancelled.load(Ordering::Acquire) {
        return Ok(BuildOutcome::Cancelled);
    }

    let dir = staged.commit()?;
    if let Err(e) = opts.storage.sweep(corpus, Some(dir.as_path())) {
        warn!(corpus = %corpus, error = %e, "Failed to remove superseded index versions");
    }

    info!(
        corpus = %corpus,
        generation = generation,
        entries = entries.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Built suggestion index"
    );

    Ok(BuildOutcome::Installed(SuggestionIndex::from_parts(
        dir, meta, entries,
    )))
}
