//! Search counts backing most-popular ranking

use crate::error::SuggesterResult;
use crate::index::storage::write_atomically;
use dashmap::DashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// How often each `(field, term)` of a corpus has been searched for
#[derive(Debug, Default)]
pub struct PopularityCounts {
    counts: DashMap<(String, String), u64>,
    loaded: AtomicBool,
    dirty: AtomicBool,
}

impl PopularityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold counts persisted at `path` into memory; only the first call reads the file
    pub fn load_once(&self, path: &Path) -> SuggesterResult<()> {
        if self.loaded.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                self.loaded.store(false, Ordering::Release);
                return Err(e.into());
            }
        };

        let persisted: Vec<(String, String, u64)> = bincode::deserialize(&bytes)?;
        for (field, term, count) in persisted {
            *self.counts.entry((field, term)).or_insert(0) += count;
        }
        Ok(())
    }

    /// Write the counts to `path` if anything changed since the last save
    pub fn save(&self, path: &Path) -> SuggesterResult<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let mut rows: Vec<(String, String, u64)> = self
            .counts
            .iter()
            .map(|entry| (entry.key().0.clone(), entry.key().1.clone(), *entry.value()))
            .collect();
        rows.sort();

        let result: SuggesterResult<()> = bincode::serialize(&rows)
            .map_err(Into::into)
            .and_then(|bytes| write_atomically(path, &bytes).map_err(Into::into));
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    pub fn increment(&self, field: &str, term: &str, by: u64) {
        let mut count = self
            .counts
            .entry((field.to_string(), term.to_string()))
            .or_insert(0);
        *count = count.saturating_add(by);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get(&self, field: &str, term: &str) -> u64 {
        self.counts
            .get(&(field.to_string(), term.to_string()))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// One page of the counts of `field`, highest first, ties by term
    pub fn page(&self, field: &str, page: usize, page_size: usize) -> Vec<(String, u64)> {
        let mut rows: Vec<(String, u64)> = self
            .counts
            .iter()
            .filter(|entry| entry.key().0 == field)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        rows.into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .collect()
    }

    /// Lookup score when most-popular ranking is enabled
    ///
    /// Search counts occupy the high 32 bits, so they dominate, and the
    /// document frequency breaks ties.
    pub fn ranked_score(&self, field: &str, term: &str, doc_freq: u64) -> u64 {
        let searches = self.get(field, term).min(u64::from(u32::MAX));
        (searches << 32) | doc_freq.min(u64::from(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_increment_and_page() {
        let counts = PopularityCounts::new();
        counts.increment("body", "beta", 2);
        counts.increment("body", "alpha", 2);
        counts.increment("body", "gamma", 5);
        counts.increment("title", "alpha", 9);

        assert_eq!(
            counts.page("body", 0, 2),
            vec![("gamma".to_string(), 5), ("alpha".to_string(), 2)]
        );
        assert_eq!(counts.page("body", 1, 2), vec![("beta".to_string(), 2)]);
        assert!(counts.page("body", 5, 2).is_empty());
    }

    #[test]
    fn test_ranked_score_orders_by_searches_first() {
        let counts = PopularityCounts::new();
        counts.increment("body", "rare", 1);

        let searched = counts.ranked_score("body", "rare", 1);
        let frequent = counts.ranked_score("body", "common", 1_000);
        assert!(searched > frequent);
        assert_eq!(frequent, 1_000);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("popularity.bin");

        let counts = PopularityCounts::new();
        counts.increment("body", "term1", 3);
        counts.save(&path).unwrap();

        let reloaded = PopularityCounts::new();
        reloaded.load_once(&path).unwrap();
        reloaded.load_once(&path).unwrap();
        assert_eq!(reloaded.get("body", "term1"), 3);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let counts = PopularityCounts::new();
        counts.load_once(&temp_dir.path().join("absent.bin")).unwrap();
        assert_eq!(counts.get("body", "x"), 0);
    }
}
