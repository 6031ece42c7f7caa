//! Lifecycle and concurrency engine of the suggester
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              SuggesterEngine                     │
//! ├─────────────────────────────────────────────────┤
//! │  - init()      - rebuild()     - search()       │
//! │  - remove()    - close()       - status()       │
//! └─────────────────────────────────────────────────┘
//!          │ submit                 │ lookup
//!          ▼                        ▼
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │  Build pool          │  │  Live versions       │
//! │  (bounded, one build │  │  Arc<SuggestionIndex>│
//! │   per corpus)        │──▶  swapped on install  │
//! └──────────────────────┘  └──────────────────────┘
//!          ▲
//!          │ tick
//! ┌──────────────────────┐
//! │  RebuildScheduler    │
//! └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use corpus_suggester::{NamedCorpus, PrefixQuery, SuggesterConfigBuilder, SuggesterEngine, TantivyCorpus};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SuggesterConfigBuilder::new()
//!         .storage_root("/var/lib/suggester")
//!         .rebuild_interval(Duration::from_secs(3600))
//!         .build();
//!     let engine = SuggesterEngine::new(config)?;
//!
//!     let project = NamedCorpus::new("project", Arc::new(TantivyCorpus::new("/var/lib/index/project")));
//!     engine.rebuild(&[project.clone()]).await?;
//!
//!     let response = engine
//!         .search(&[project], Arc::new(PrefixQuery::new("body", "ter")), None)
//!         .await?;
//!     println!("{:?}", response.phrases());
//!
//!     engine.close().await?;
//!     Ok(())
//! }
//! ```

mod core;
mod state;

pub use self::core::SuggesterEngine;
pub use self::state::{CorpusFailure, CorpusStatus, EngineStatus, ResultFilter, SearchResponse};
