//! Persisted per-corpus suggestion indexes
//!
//! Every corpus owns one storage unit under the configured root. Inside it,
//! each build writes a fresh, immutable version directory; a `CURRENT` file
//! names the version that is live. Nothing is ever modified in place.
//!
//! ```text
//! <storage_root>/<corpus>/
//!     CURRENT               name of the live version directory
//!     v-<id>/meta.json      IndexMeta
//!     v-<id>/entries.bin    sorted SuggestionEntry rows (bincode)
//!     .staging-<id>/        build in progress
//!     popularity.bin        recorded search counts
//! ```
//!
//! - [`IndexStorage`] - directory layout, staging and install
//! - [`SuggestionIndex`] - one loaded, immutable version used for lookups
//! - [`PopularityCounts`] - search counts backing most-popular ranking
//! - [`build_index`] - the build algorithm run by the engine's worker pool

mod builder;
mod popularity;
mod storage;
mod version;

pub use builder::{build_index, BuildOptions, BuildOutcome};
pub use popularity::PopularityCounts;
pub use storage::{validate_corpus_name, IndexStorage, StagedVersion};
pub use version::SuggestionIndex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One suggestible term of a corpus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionEntry {
    /// Field the term was extracted from
    pub field: String,

    /// The term itself
    pub term: String,

    /// Popularity score assigned at build time (document frequency)
    pub score: u64,
}

/// Metadata stored next to every index version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Corpus the version belongs to
    pub corpus: String,

    /// Generation marker of the corpus snapshot the version was built from
    pub generation: u64,

    /// When the build finished
    pub built_at: DateTime<Utc>,

    /// Number of entries across all fields
    pub entry_count: usize,

    /// Fields scanned by the build, sorted
    pub fields: Vec<String>,
}
