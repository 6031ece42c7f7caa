//! Corpus source backed by a tantivy index directory

use crate::corpus::{CorpusSnapshot, CorpusSource, TermStats};
use crate::error::{SuggesterError, SuggesterResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tantivy::schema::{FieldType, Schema};
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher};

/// A tantivy index on disk
#[derive(Debug, Clone)]
pub struct TantivyCorpus {
    index_path: PathBuf,
}

impl TantivyCorpus {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}

impl CorpusSource for TantivyCorpus {
    fn open(&self) -> SuggesterResult<Box<dyn CorpusSnapshot>> {
        let index = Index::open_in_dir(&self.index_path).map_err(|e| {
            SuggesterError::Source(format!(
                "Failed to open index at {}: {}",
                self.index_path.display(),
                e
            ))
        })?;

        // The opstamp advances with every commit, which makes it the generation marker
        let generation = index.load_metas()?.opstamp;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Box::new(TantivySnapshot {
            schema: index.schema(),
            searcher: reader.searcher(),
            generation,
        }))
    }

    fn describe(&self) -> String {
        self.index_path.display().to_string()
    }
}

/// Searcher pinned to the segments that were live when the snapshot was opened
pub struct TantivySnapshot {
    schema: Schema,
    searcher: Searcher,
    generation: u64,
}

impl CorpusSnapshot for TantivySnapshot {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn fields(&self) -> Vec<String> {
        self.schema
            .fields()
            .filter(|(_, entry)| entry.is_indexed() && matches!(entry.field_type(), FieldType::Str(_)))
            .map(|(_, entry)| entry.name().to_string())
            .collect()
    }

    fn terms(&self, field_name: &str) -> SuggesterResult<Vec<TermStats>> {
        let field = self
            .schema
            .get_field(field_name)
            .map_err(|e| SuggesterError::Source(format!("Unknown field '{}': {}", field_name, e)))?;

        // Terms repeat across segments; document frequencies add up
        let mut doc_freqs: HashMap<String, u64> = HashMap::new();

        for segment_reader in self.searcher.segment_readers() {
            let inverted_index = segment_reader.inverted_index(field)?;
            let mut stream = inverted_index.terms().stream()?;

            while stream.advance() {
                let term = match std::str::from_utf8(stream.key()) {
                    Ok(term) => term,
                    Err(_) => continue,
                };
                *doc_freqs.entry(term.to_string()).or_insert(0) +=
                    u64::from(stream.value().doc_freq);
            }
        }

        Ok(doc_freqs
            .into_iter()
            .map(|(term, doc_freq)| TermStats { term, doc_freq })
            .collect())
    }
}
