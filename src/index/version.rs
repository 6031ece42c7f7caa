//! Loaded, immutable index versions

use crate::error::SuggesterResult;
use crate::index::storage::{read_entries, read_meta};
use crate::index::{IndexMeta, SuggestionEntry};
use crate::query::SuggesterQuery;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// One installed version of a corpus's suggestion index
///
/// Shared behind an `Arc`: searches clone the handle and keep serving from it
/// even after a rebuild has replaced it. A replaced version is marked retired
/// and its directory is deleted once the last handle drops.
#[derive(Debug)]
pub struct SuggestionIndex {
    meta: IndexMeta,
    dir: PathBuf,
    /// Terms per field, sorted by term
    fields: HashMap<String, Vec<(String, u64)>>,
    retired: AtomicBool,
}

impl SuggestionIndex {
    /// Load a committed version directory
    pub fn load(dir: &Path) -> SuggesterResult<Self> {
        let meta = read_meta(dir)?;
        let entries = read_entries(dir)?;
        Ok(Self::from_parts(dir.to_path_buf(), meta, entries))
    }

    pub(crate) fn from_parts(dir: PathBuf, meta: IndexMeta, entries: Vec<SuggestionEntry>) -> Self {
        let mut fields: HashMap<String, Vec<(String, u64)>> = HashMap::new();
        for entry in entries {
            fields
                .entry(entry.field)
                .or_default()
                .push((entry.term, entry.score));
        }
        for terms in fields.values_mut() {
            terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }

        Self {
            meta,
            dir,
            fields,
            retired: AtomicBool::new(false),
        }
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score of `term` in `field`, if present
    pub fn score_of(&self, field: &str, term: &str) -> Option<u64> {
        let terms = self.fields.get(field)?;
        terms
            .binary_search_by(|(t, _)| t.as_str().cmp(term))
            .ok()
            .map(|i| terms[i].1)
    }

    pub fn contains(&self, field: &str, term: &str) -> bool {
        self.score_of(field, term).is_some()
    }

    /// All entries matching `query`, in term order
    pub fn lookup(&self, query: &dyn SuggesterQuery) -> Vec<SuggestionEntry> {
        let Some(terms) = self.fields.get(query.field()) else {
            return Vec::new();
        };

        let prefix = query.literal_prefix();
        let start = terms.partition_point(|(term, _)| term.as_str() < prefix);

        terms[start..]
            .iter()
            .take_while(|(term, _)| term.starts_with(prefix))
            .filter(|(term, _)| query.matches(term))
            .map(|(term, score)| SuggestionEntry {
                field: query.field().to_string(),
                term: term.clone(),
                score: *score,
            })
            .collect()
    }

    /// Every entry, sorted by field then term
    pub fn entries(&self) -> Vec<SuggestionEntry> {
        let mut field_names: Vec<&String> = self.fields.keys().collect();
        field_names.sort();

        field_names
            .into_iter()
            .flat_map(|field| {
                self.fields[field].iter().map(move |(term, score)| SuggestionEntry {
                    field: field.clone(),
                    term: term.clone(),
                    score: *score,
                })
            })
            .collect()
    }

    /// Mark this version as replaced; its directory goes away with the last handle
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

impl Drop for SuggestionIndex {
    fn drop(&mut self) {
        if !self.is_retired() {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(path = %self.dir.display(), "Removed retired index version"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.dir.display(), error = %e, "Failed to remove retired index version"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PrefixQuery, RegexQuery};
    use chrono::Utc;
    use tempfile::TempDir;

    fn index_at(dir: PathBuf) -> SuggestionIndex {
        let entries = vec![
            SuggestionEntry { field: "body".into(), term: "term2".into(), score: 1 },
            SuggestionEntry { field: "body".into(), term: "apple".into(), score: 4 },
            SuggestionEntry { field: "body".into(), term: "term1".into(), score: 2 },
            SuggestionEntry { field: "title".into(), term: "term9".into(), score: 1 },
        ];
        let meta = IndexMeta {
            corpus: "p".into(),
            generation: 1,
            built_at: Utc::now(),
            entry_count: entries.len(),
            fields: vec!["body".into(), "title".into()],
        };
        SuggestionIndex::from_parts(dir, meta, entries)
    }

    #[test]
    fn test_prefix_lookup_stays_in_field() {
        let index = index_at(PathBuf::from("/nonexistent"));
        let hits = index.lookup(&PrefixQuery::new("body", "te"));
        let terms: Vec<_> = hits.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["term1", "term2"]);
        assert!(hits.iter().all(|e| e.field == "body"));
    }

    #[test]
    fn test_regex_lookup_scans_field() {
        let index = index_at(PathBuf::from("/nonexistent"));
        let hits = index.lookup(&RegexQuery::new("body", ".*2").unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].term, "term2");
    }

    #[test]
    fn test_unknown_field_is_empty() {
        let index = index_at(PathBuf::from("/nonexistent"));
        assert!(index.lookup(&PrefixQuery::new("path", "t")).is_empty());
    }

    #[test]
    fn test_score_of() {
        let index = index_at(PathBuf::from("/nonexistent"));
        assert_eq!(index.score_of("body", "apple"), Some(4));
        assert_eq!(index.score_of("title", "apple"), None);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_retired_version_removes_directory_on_last_drop() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("v-1");
        fs::create_dir_all(&dir).unwrap();

        let index = std::sync::Arc::new(index_at(dir.clone()));
        let reader = index.clone();
        index.retire();
        drop(index);
        assert!(dir.exists(), "a reader still holds the version");

        assert_eq!(reader.lookup(&PrefixQuery::new("body", "a")).len(), 1);
        drop(reader);
        assert!(!dir.exists());
    }

    #[test]
    fn test_live_version_keeps_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("v-2");
        fs::create_dir_all(&dir).unwrap();

        drop(index_at(dir.clone()));
        assert!(dir.exists());
    }
}
