//! Read-only access to the document index a corpus is built from
//!
//! The suggester never writes documents. It only needs two capabilities from
//! the document index that sits next to it:
//!
//! - [`CorpusSource`] - where a corpus lives; opened once per build
//! - [`CorpusSnapshot`] - a point-in-time view used to enumerate terms and
//!   read the generation marker; dropped as soon as the build is done
//!
//! [`TantivyCorpus`] implements both over a tantivy index directory.

mod tantivy_source;

pub use tantivy_source::{TantivyCorpus, TantivySnapshot};

use crate::error::SuggesterResult;
use std::fmt;
use std::sync::Arc;

/// A distinct term of one field with its document frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermStats {
    pub term: String,
    pub doc_freq: u64,
}

impl TermStats {
    pub fn new(term: impl Into<String>, doc_freq: u64) -> Self {
        Self {
            term: term.into(),
            doc_freq,
        }
    }
}

/// Location of a corpus's document index
pub trait CorpusSource: Send + Sync {
    /// Open a snapshot of the corpus as it is right now
    fn open(&self) -> SuggesterResult<Box<dyn CorpusSnapshot>>;

    /// Human readable location, used in logs
    fn describe(&self) -> String;
}

/// Point-in-time view over a corpus's documents
pub trait CorpusSnapshot: Send + Sync {
    /// Marker that changes whenever the corpus's documents change
    fn generation(&self) -> u64;

    /// Indexed text fields
    fn fields(&self) -> Vec<String>;

    /// Distinct terms of `field`, in any order
    fn terms(&self, field: &str) -> SuggesterResult<Vec<TermStats>>;
}

/// A corpus name paired with the location of its document index
#[derive(Clone)]
pub struct NamedCorpus {
    pub name: String,
    pub source: Arc<dyn CorpusSource>,
}

impl NamedCorpus {
    pub fn new(name: impl Into<String>, source: Arc<dyn CorpusSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

impl fmt::Debug for NamedCorpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCorpus")
            .field("name", &self.name)
            .field("source", &self.source.describe())
            .finish()
    }
}
