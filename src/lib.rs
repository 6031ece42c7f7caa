//! Per-corpus term suggestions beside a full-text index
//!
//! For every named corpus the engine keeps a persisted, versioned list of the
//! terms found in that corpus's documents and completes prefixes against it,
//! merged across whichever corpora a caller selects. Builds run on a bounded
//! pool, are refreshed on a schedule, and are installed atomically so searches
//! never see a half-built index.
//!
//! - [`engine`] - `SuggesterEngine`: init, rebuild, search, remove, close
//! - [`index`] - on-disk versions and the build algorithm
//! - [`merger`] - cross-corpus ranking and deduplication
//! - [`scheduler`] - periodic and cron-triggered rebuilds
//! - [`corpus`] - read-only access to the document index
//! - [`query`] - term matchers

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod index;
pub mod merger;
pub mod metrics;
pub mod query;
pub mod scheduler;

pub use config::{SuggesterConfig, SuggesterConfigBuilder};
pub use corpus::{CorpusSnapshot, CorpusSource, NamedCorpus, TantivyCorpus, TermStats};
pub use engine::{
    CorpusFailure, CorpusStatus, EngineStatus, ResultFilter, SearchResponse, SuggesterEngine,
};
pub use error::{SuggesterError, SuggesterResult};
pub use merger::{LookupResultItem, ResultMerger};
pub use query::{PrefixQuery, RegexQuery, SuggesterQuery};
