//! Common test utilities for suggester integration tests
//!
//! Corpora are real tantivy indexes in temporary directories with a single
//! text field named `test`.

#![allow(dead_code)]

use corpus_suggester::{
    CorpusSnapshot, CorpusSource, NamedCorpus, PrefixQuery, SuggesterConfigBuilder,
    SuggesterEngine, SuggesterError, SuggesterResult, TantivyCorpus, TermStats,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tantivy::schema::{Field, Schema, TEXT};
use tantivy::{doc, Index, IndexWriter};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const FIELD: &str = "test";

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A tantivy index the tests can append documents to
pub struct TestCorpus {
    dir: TempDir,
    index: Index,
    field: Field,
}

impl TestCorpus {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut schema_builder = Schema::builder();
        let field = schema_builder.add_text_field(FIELD, TEXT);
        let index = Index::create_in_dir(dir.path(), schema_builder.build()).unwrap();

        Self { dir, index, field }
    }

    /// Corpus with one document per entry of `texts`
    pub fn with_text(texts: &[&str]) -> Self {
        let corpus = Self::new();
        corpus.add_text(texts);
        corpus
    }

    /// Add one document per entry of `texts` and commit
    pub fn add_text(&self, texts: &[&str]) {
        let mut writer: IndexWriter = self.index.writer_with_num_threads(1, 20_000_000).unwrap();
        for text in texts {
            writer.add_document(doc!(self.field => *text)).unwrap();
        }
        writer.commit().unwrap();
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn named(&self, name: &str) -> NamedCorpus {
        NamedCorpus::new(name, Arc::new(TantivyCorpus::new(self.dir.path())))
    }

    /// Same documents, but every field takes `delay` to enumerate
    pub fn slow(&self, name: &str, delay: Duration) -> NamedCorpus {
        NamedCorpus::new(
            name,
            Arc::new(FaultyCorpus {
                inner: TantivyCorpus::new(self.dir.path()),
                delay,
                fail_terms: false,
            }),
        )
    }

    /// Same documents, but terms can never be read although the index opens
    pub fn unreadable_terms(&self, name: &str) -> NamedCorpus {
        NamedCorpus::new(
            name,
            Arc::new(FaultyCorpus {
                inner: TantivyCorpus::new(self.dir.path()),
                delay: Duration::ZERO,
                fail_terms: true,
            }),
        )
    }
}

/// Tantivy corpus whose term enumeration is delayed or fails
struct FaultyCorpus {
    inner: TantivyCorpus,
    delay: Duration,
    fail_terms: bool,
}

struct FaultySnapshot {
    inner: Box<dyn CorpusSnapshot>,
    delay: Duration,
    fail_terms: bool,
}

impl CorpusSource for FaultyCorpus {
    fn open(&self) -> SuggesterResult<Box<dyn CorpusSnapshot>> {
        Ok(Box::new(FaultySnapshot {
            inner: self.inner.open()?,
            delay: self.delay,
            fail_terms: self.fail_terms,
        }))
    }

    fn describe(&self) -> String {
        format!("faulty {}", self.inner.describe())
    }
}

impl CorpusSnapshot for FaultySnapshot {
    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    fn fields(&self) -> Vec<String> {
        self.inner.fields()
    }

    fn terms(&self, field: &str) -> SuggesterResult<Vec<TermStats>> {
        std::thread::sleep(self.delay);
        if self.fail_terms {
            return Err(SuggesterError::Source(format!("terms of {} are unreadable", field)));
        }
        self.inner.terms(field)
    }
}

/// Source whose snapshots can never be opened
pub struct BrokenCorpus;

impl CorpusSource for BrokenCorpus {
    fn open(&self) -> SuggesterResult<Box<dyn CorpusSnapshot>> {
        Err(SuggesterError::Source("corpus is unavailable".to_string()))
    }

    fn describe(&self) -> String {
        "broken".to_string()
    }
}

pub fn broken(name: &str) -> NamedCorpus {
    NamedCorpus::new(name, Arc::new(BrokenCorpus))
}

/// Config rooted at `root` whose scheduled rebuild never fires during a test
pub fn test_config(root: &Path) -> SuggesterConfigBuilder {
    SuggesterConfigBuilder::new()
        .storage_root(root)
        .rebuild_interval(Duration::from_secs(3600))
}

pub fn create_engine(root: &Path) -> SuggesterEngine {
    init_tracing();
    SuggesterEngine::new(test_config(root).build()).unwrap()
}

/// Poll `condition` until it holds, failing the test after ten seconds
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Staging directories left in the storage unit of `corpus`
pub fn staging_dirs(root: &Path, corpus: &str) -> Vec<String> {
    std::fs::read_dir(root.join(corpus))
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(".staging-"))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn wait_building(engine: &SuggesterEngine, name: &str) {
    wait_until(|| {
        engine
            .corpus_status(name)
            .ok()
            .flatten()
            .map_or(false, |status| status.building)
    })
    .await;
}

pub async fn wait_ready(engine: &SuggesterEngine, name: &str) {
    wait_until(|| engine.is_ready(name).unwrap_or(false)).await;
}

/// Sorted phrases suggested for `prefix` in the test field
pub async fn suggest(engine: &SuggesterEngine, corpora: &[NamedCorpus], prefix: &str) -> Vec<String> {
    let response = engine
        .search(corpora, Arc::new(PrefixQuery::new(FIELD, prefix)), None)
        .await
        .unwrap();
    let mut phrases: Vec<String> = response.items.into_iter().map(|item| item.phrase).collect();
    phrases.sort();
    phrases
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
