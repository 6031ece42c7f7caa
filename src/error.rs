use thiserror::Error;

/// Result type for suggester operations
pub type SuggesterResult<T> = std::result::Result<T, SuggesterError>;

/// Errors that can occur in the suggester engine
#[derive(Error, Debug)]
pub enum SuggesterError {
    /// Bad constructor arguments
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed query handed to search
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Building or rebuilding one corpus failed
    #[error("Build failed for corpus '{corpus}': {message}")]
    BuildFailure { corpus: String, message: String },

    /// Corpus storage could not be removed
    #[error("Storage error for corpus '{corpus}': {message}")]
    StorageError { corpus: String, message: String },

    /// Any call after close
    #[error("Suggester engine is closed")]
    EngineClosed,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors raised by the underlying document index
    #[error("Corpus source error: {0}")]
    Source(String),
}

impl SuggesterError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            SuggesterError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            SuggesterError::InvalidQuery(_) => "INVALID_QUERY",
            SuggesterError::BuildFailure { .. } => "BUILD_FAILURE",
            SuggesterError::StorageError { .. } => "STORAGE_ERROR",
            SuggesterError::EngineClosed => "ENGINE_CLOSED",
            SuggesterError::Io(_) => "IO_ERROR",
            SuggesterError::Serialization(_) => "SERIALIZATION_ERROR",
            SuggesterError::Source(_) => "SOURCE_ERROR",
        }
    }

    /// Wrap any error raised while building `corpus` as a `BuildFailure`
    pub(crate) fn build_failure(corpus: &str, err: impl std::fmt::Display) -> Self {
        SuggesterError::BuildFailure {
            corpus: corpus.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<tantivy::TantivyError> for SuggesterError {
    fn from(err: tantivy::TantivyError) -> Self {
        SuggesterError::Source(err.to_string())
    }
}

impl From<bincode::Error> for SuggesterError {
    fn from(err: bincode::Error) -> Self {
        SuggesterError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SuggesterError {
    fn from(err: serde_json::Error) -> Self {
        SuggesterError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SuggesterError {
    fn from(err: config::ConfigError) -> Self {
        SuggesterError::InvalidConfiguration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SuggesterError::InvalidQuery("test".to_string()).error_code(),
            "INVALID_QUERY"
        );
        assert_eq!(SuggesterError::EngineClosed.error_code(), "ENGINE_CLOSED");
        assert_eq!(
            SuggesterError::build_failure("p", "boom").error_code(),
            "BUILD_FAILURE"
        );
    }

    #[test]
    fn test_build_failure_message_names_corpus() {
        let err = SuggesterError::build_failure("project-a", "disk full");
        assert_eq!(
            err.to_string(),
            "Build failed for corpus 'project-a': disk full"
        );
    }
}
