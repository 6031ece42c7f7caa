//! Merging per-corpus suggestion lists into one bounded result list
//!
//! Suggestions are phrase-level from the caller's point of view: a
//! `(phrase, field)` pair reported by several corpora appears once, carried
//! by its best-ranked occurrence.
//!
//! Ranking is a total order: score descending, then phrase ascending, then
//! corpus name ascending, then field ascending.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// One row of a search result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupResultItem {
    /// The completed phrase
    pub phrase: String,

    /// Field the phrase matched in
    pub field: String,

    /// Corpus the phrase was taken from
    pub corpus: String,

    /// Rank-contributing score
    pub score: u64,
}

impl LookupResultItem {
    pub fn new(
        phrase: impl Into<String>,
        field: impl Into<String>,
        corpus: impl Into<String>,
        score: u64,
    ) -> Self {
        Self {
            phrase: phrase.into(),
            field: field.into(),
            corpus: corpus.into(),
            score,
        }
    }
}

/// Ranking order of result items; `Less` ranks first
pub fn compare_items(a: &LookupResultItem, b: &LookupResultItem) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.phrase.cmp(&b.phrase))
        .then_with(|| a.corpus.cmp(&b.corpus))
        .then_with(|| a.field.cmp(&b.field))
}

/// Collects candidates from any number of corpora and emits the top results
#[derive(Debug)]
pub struct ResultMerger {
    max_results: usize,
    best: HashMap<(String, String), LookupResultItem>,
}

impl ResultMerger {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results,
            best: HashMap::new(),
        }
    }

    /// Add one candidate, keeping only the best occurrence of its `(phrase, field)`
    pub fn push(&mut self, item: LookupResultItem) {
        match self.best.entry((item.phrase.clone(), item.field.clone())) {
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
            Entry::Occupied(mut slot) => {
                if compare_items(&item, slot.get()) == Ordering::Less {
                    slot.insert(item);
                }
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = LookupResultItem>>(&mut self, items: I) {
        for item in items {
            self.push(item);
        }
    }

    /// Ranked, deduplicated results, truncated to the configured maximum
    pub fn into_sorted(self) -> Vec<LookupResultItem> {
        let mut items: Vec<LookupResultItem> = self.best.into_values().collect();
        top_k(&mut items, self.max_results);
        items
    }

    /// Merge whole per-corpus lists in one call
    pub fn merge<I>(max_results: usize, lists: I) -> Vec<LookupResultItem>
    where
        I: IntoIterator<Item = Vec<LookupResultItem>>,
    {
        let mut merger = Self::new(max_results);
        for list in lists {
            merger.extend(list);
        }
        merger.into_sorted()
    }
}

/// Sort `items` by rank and keep the first `k`
///
/// Truncating each corpus's list to `k` before merging never changes the
/// merged top `k`: within one corpus `(phrase, field)` is unique, so every
/// item ranked above a survivor maps to a distinct merged item ranked above it.
pub fn top_k(items: &mut Vec<LookupResultItem>, k: usize) {
    if k == 0 {
        items.clear();
        return;
    }
    if items.len() > k {
        items.select_nth_unstable_by(k - 1, compare_items);
        items.truncate(k);
    }
    items.sort_unstable_by(compare_items);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(phrase: &str, corpus: &str, score: u64) -> LookupResultItem {
        LookupResultItem::new(phrase, "body", corpus, score)
    }

    fn phrases(items: &[LookupResultItem]) -> Vec<&str> {
        items.iter().map(|i| i.phrase.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_then_phrase_then_corpus() {
        let merged = ResultMerger::merge(
            10,
            vec![
                vec![item("beta", "q", 5), item("alpha", "q", 5)],
                vec![item("gamma", "p", 9), item("delta", "p", 1)],
            ],
        );
        assert_eq!(phrases(&merged), vec!["gamma", "alpha", "beta", "delta"]);
    }

    #[test]
    fn test_same_phrase_keeps_best_occurrence() {
        let merged = ResultMerger::merge(
            10,
            vec![vec![item("term", "p", 2)], vec![item("term", "q", 7)]],
        );
        assert_eq!(merged, vec![item("term", "q", 7)]);
    }

    #[test]
    fn test_tied_duplicate_keeps_smallest_corpus() {
        let merged = ResultMerger::merge(
            10,
            vec![vec![item("term", "zeta", 3)], vec![item("term", "alpha", 3)]],
        );
        assert_eq!(merged, vec![item("term", "alpha", 3)]);
    }

    #[test]
    fn test_same_phrase_in_different_fields_is_kept() {
        let mut merger = ResultMerger::new(10);
        merger.push(LookupResultItem::new("term", "body", "p", 1));
        merger.push(LookupResultItem::new("term", "title", "p", 1));
        assert_eq!(merger.into_sorted().len(), 2);
    }

    #[test]
    fn test_truncates_to_max_results() {
        let list: Vec<_> = (0..50).map(|i| item(&format!("t{:02}", i), "p", i)).collect();
        let merged = ResultMerger::merge(5, vec![list.clone(), list]);
        assert_eq!(merged.len(), 5);
        assert_eq!(phrases(&merged), vec!["t49", "t48", "t47", "t46", "t45"]);
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let mut items: Vec<_> = (0..30)
            .map(|i| item(&format!("p{}", i % 7), &format!("c{}", i % 3), (i * 7 % 5) as u64))
            .collect();
        let mut expected = items.clone();
        expected.sort_by(compare_items);
        expected.truncate(8);

        top_k(&mut items, 8);
        assert_eq!(items, expected);
    }

    #[test]
    fn test_zero_max_results_is_empty() {
        assert!(ResultMerger::merge(0, vec![vec![item("a", "p", 1)]]).is_empty());
    }
}
